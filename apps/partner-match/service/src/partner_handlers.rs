use super::*;

#[derive(Debug, Deserialize)]
struct RegisterPartnerPayload {
    id: Option<String>,
    name: Option<String>,
}

pub(super) async fn list_partners(
    State(state): State<AppState>,
) -> Result<Json<Vec<Partner>>, ApiErrorTuple> {
    let partners = state
        .partners
        .list_all()
        .await
        .map_err(map_service_error)?;
    Ok(Json(partners))
}

pub(super) async fn show_partner(
    State(state): State<AppState>,
    Path(partner_id): Path<String>,
) -> Result<Json<Partner>, ApiErrorTuple> {
    let partner_id = parse_uuid("partner_id", &partner_id).map_err(map_service_error)?;
    let partner = state
        .partners
        .get(partner_id)
        .await
        .map_err(map_service_error)?;
    Ok(Json(partner))
}

/// Accepts any body that parses as a JSON object; a content type is not
/// required.
pub(super) async fn register_partner(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Partner>, ApiErrorTuple> {
    let payload = serde_json::from_slice::<RegisterPartnerPayload>(&body).map_err(|_| {
        validation_error("body", "Request body must be a JSON object with id and name.")
    })?;

    let partner = state
        .partners
        .register(
            payload.id.as_deref().unwrap_or_default(),
            payload.name.as_deref().unwrap_or_default(),
        )
        .await
        .map_err(map_service_error)?;
    Ok(Json(partner))
}

pub(super) async fn delete_partner(
    State(state): State<AppState>,
    Path(partner_id): Path<String>,
) -> Result<Json<Partner>, ApiErrorTuple> {
    // A malformed id cannot name a stored partner.
    let Ok(id) = parse_uuid("partner_id", &partner_id) else {
        return Err(not_found_error(format!(
            "partner with id {partner_id} not found"
        )));
    };

    let partner = state
        .partners
        .remove(id)
        .await
        .map_err(map_service_error)?;
    Ok(Json(partner))
}
