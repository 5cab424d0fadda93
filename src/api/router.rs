use super::*;

pub fn build_router(state: AppState, security: ApiSecurity) -> Router {
    Router::new()
        .route("/commands", get(list_commands).post(submit_command))
        .route("/commands/recent", get(recent_commands))
        .route("/commands/{id}", get(get_command))
        .route("/commands/{id}/approve", post(approve_command))
        .route("/commands/{id}/deny", post(deny_command))
        .route("/commands/{id}/undo", post(undo_command))
        .route("/commands/{id}/repeat", post(repeat_command))
        .route("/status", get(get_status))
        .route("/client/poll", get(client_poll))
        .route("/client/report", post(client_report))
        .route("/client/level_change", post(client_level_change))
        .route("/client/shutdown", post(client_shutdown))
        .route("/client/pending_reruns", get(client_pending_reruns))
        .with_state(state)
        .layer(middleware::from_fn_with_state(security, security::api_guard))
}
