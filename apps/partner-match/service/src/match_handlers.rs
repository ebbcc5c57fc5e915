use super::*;

#[derive(Debug, Deserialize)]
pub(super) struct MatchQuery {
    user_id: Option<String>,
    partner_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct MatchResponse {
    partner_id: String,
    timestamp: i64,
}

/// Records a partner's visitor id against the caller's cookie identity.
///
/// Always answers 200 with CORS credentials headers; unknown or malformed
/// partner ids are ignored so the cookie side effect still lands.
pub(super) async fn sync_visitor(
    State(state): State<AppState>,
    Path((partner_id, partner_user_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiErrorTuple> {
    let cookie = extract_cookie_value(&headers, USER_ID_COOKIE_NAME);
    let identity = resolve_identity(cookie.as_deref());

    let mut response = StatusCode::OK.into_response();
    response.headers_mut().insert(
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    if let Some(origin) = headers.get(ORIGIN) {
        response
            .headers_mut()
            .insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    }

    if identity.is_new {
        let cookie = user_id_cookie(
            &identity.id,
            state.config.cookie_max_age_seconds,
            state.config.cookie_cross_site,
        );
        append_set_cookie_header(&mut response, &cookie)?;
    }

    let Ok(partner_id) = parse_uuid("partner_id", &partner_id) else {
        tracing::debug!(
            target: "partner_match.api",
            partner_id = %partner_id,
            "sync ignored malformed partner id",
        );
        return Ok(response);
    };

    state
        .matches
        .sync(identity.id, partner_id, &partner_user_id)
        .await
        .map_err(map_service_error)?;

    Ok(response)
}

pub(super) async fn match_visitor(
    State(state): State<AppState>,
    Query(query): Query<MatchQuery>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let user_id = parse_uuid("user_id", query.user_id.as_deref().unwrap_or_default())
        .map_err(map_service_error)?;
    let partner_id = parse_uuid("partner_id", query.partner_id.as_deref().unwrap_or_default())
        .map_err(map_service_error)?;

    let pairing = state
        .matches
        .lookup(user_id, partner_id)
        .await
        .map_err(map_service_error)?;

    Ok(Json(MatchResponse {
        partner_id: pairing.visitor_id,
        timestamp: pairing.timestamp,
    }))
}
