use super::*;

/// Serves the next promoted command to the game client. Non-blocking:
/// an empty buffer yields `command: null` and the client polls again.
///
/// The queue pop committed back in the dispatcher tick; the tracker
/// insert happens here. A crash between the two loses that command —
/// accepted window, matching the reference behavior.
pub(super) async fn client_poll(State(state): State<AppState>) -> Json<ApiResponse<PollResponse>> {
    match state.promoted.try_recv() {
        Ok(item) => {
            state
                .tracker
                .start_execution(&state.store, item.command_id, item.script.clone());
            tracing::info!(command_id = item.command_id, "command dispatched to client");
            Json(ApiResponse::success(PollResponse {
                command: Some(PolledCommand {
                    command_id: item.command_id,
                    script: item.script,
                }),
            }))
        }
        Err(_) => Json(ApiResponse::success(PollResponse { command: None })),
    }
}

pub(super) async fn client_report(
    State(state): State<AppState>,
    Json(req): Json<ReportRequest>,
) -> Json<ApiResponse<String>> {
    if !state
        .store
        .report_result(req.command_id, req.success, req.error.clone())
    {
        return Json(ApiResponse::err("Unknown command id"));
    }
    if req.success {
        state.tracker.check_consumption(&state.store, req.command_id);
    } else {
        // Failed scripts are dropped from tracking; a later level change
        // must not rerun them.
        state.tracker.abandon(req.command_id);
        tracing::warn!(
            command_id = req.command_id,
            error = req.error.as_deref().unwrap_or(""),
            "client reported failure"
        );
    }
    Json(ApiResponse::ok())
}

pub(super) async fn client_level_change(
    State(state): State<AppState>,
    Json(req): Json<LevelChangeRequest>,
) -> Json<ApiResponse<LevelChangeResponse>> {
    let pending_reruns =
        state
            .tracker
            .handle_level_change(&state.store, &req.map_id, req.is_save_load);
    Json(ApiResponse::success(LevelChangeResponse { pending_reruns }))
}

pub(super) async fn client_shutdown(
    State(state): State<AppState>,
    Json(req): Json<ShutdownRequest>,
) -> Json<ApiResponse<String>> {
    state
        .tracker
        .handle_shutdown_timestamp(&state.store, req.time_ms);
    Json(ApiResponse::ok())
}

/// Called by the client once the new level has finished loading. Drains
/// the rerun queue, schedules each entry's requeue after its delay, and
/// returns the drained list.
pub(super) async fn client_pending_reruns(
    State(state): State<AppState>,
) -> Json<ApiResponse<PendingRerunsResponse>> {
    let pending_reruns = state.tracker.take_pending_reruns();
    for rerun in &pending_reruns {
        let store = state.store.clone();
        let command_id = rerun.command_id;
        let script = rerun.script.clone();
        let delay = rerun.delay_secs;
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(delay)).await;
            if store.requeue(command_id, script) {
                tracing::info!(command_id, "interrupted command requeued");
            }
        });
    }
    Json(ApiResponse::success(PendingRerunsResponse { pending_reruns }))
}
