use super::*;

pub(super) async fn submit_command(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> Json<ApiResponse<SubmitResponse>> {
    if req.script.trim().is_empty() {
        return Json(ApiResponse {
            ok: false,
            data: None,
            error: Some("Script cannot be empty".into()),
        });
    }
    let (initial_status, add_to_queue) = if req.hold_for_moderation {
        (CommandStatus::PendingModeration, false)
    } else {
        (CommandStatus::Queued, true)
    };
    let record = state.store.enqueue(NewCommand {
        prompt: req.prompt,
        execution_script: req.script,
        inverse_script: req.inverse_script,
        source: req.source,
        author: req.author,
        user_id: req.user_id,
        image_context: req.image_context,
        initial_status,
        add_to_queue,
    });
    tracing::info!(
        command_id = record.id,
        source = %record.source,
        held = req.hold_for_moderation,
        "command submitted"
    );
    Json(ApiResponse::success(SubmitResponse {
        command_id: record.id,
        status: record.status,
    }))
}

pub(super) async fn approve_command(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Json<ApiResponse<String>> {
    let Some(record) = state.store.get_command(id) else {
        return Json(ApiResponse::err("Unknown command id"));
    };
    if record.status != CommandStatus::PendingModeration {
        return Json(ApiResponse::err("Command is not pending moderation"));
    }
    state.store.update_status(id, CommandStatus::Queued);
    state.store.requeue(id, record.execution_script);
    Json(ApiResponse::ok())
}

pub(super) async fn deny_command(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Json<ApiResponse<String>> {
    let Some(record) = state.store.get_command(id) else {
        return Json(ApiResponse::err("Unknown command id"));
    };
    if record.status != CommandStatus::PendingModeration {
        return Json(ApiResponse::err("Command is not pending moderation"));
    }
    state.store.update_status(id, CommandStatus::Denied);
    Json(ApiResponse::ok())
}

/// Undo is cooperative: the stored inverse script is queued under the
/// original id. Nothing in flight is cancelled.
pub(super) async fn undo_command(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Json<ApiResponse<String>> {
    let Some(record) = state.store.get_command(id) else {
        return Json(ApiResponse::err("Unknown command id"));
    };
    if record.status != CommandStatus::Executing && !record.status.is_terminal() {
        return Json(ApiResponse::err("Command has not executed yet"));
    }
    if record.inverse_script.trim().is_empty() {
        return Json(ApiResponse::err("Command has no inverse script"));
    }
    state.store.requeue(id, record.inverse_script);
    state.store.update_status(id, CommandStatus::Undone);
    Json(ApiResponse::ok())
}

pub(super) async fn repeat_command(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Json<ApiResponse<String>> {
    let Some(record) = state.store.get_command(id) else {
        return Json(ApiResponse::err("Unknown command id"));
    };
    state.store.requeue(id, record.execution_script);
    Json(ApiResponse::ok())
}

pub(super) async fn list_commands(
    State(state): State<AppState>,
) -> Json<ApiResponse<CommandListResponse>> {
    Json(ApiResponse::success(CommandListResponse {
        commands: state.store.get_history(),
    }))
}

pub(super) async fn recent_commands(
    State(state): State<AppState>,
    Query(params): Query<RecentParams>,
) -> Json<ApiResponse<CommandListResponse>> {
    let limit = params.limit.unwrap_or(20);
    Json(ApiResponse::success(CommandListResponse {
        commands: state.store.get_recent(limit),
    }))
}

pub(super) async fn get_command(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> axum::response::Response {
    match state.store.get_command(id) {
        Some(record) => Json(ApiResponse::success(record)).into_response(),
        None => Json(ApiResponse::err("Unknown command id")).into_response(),
    }
}

pub(super) async fn get_status(State(state): State<AppState>) -> Json<ApiResponse<StatusResponse>> {
    let depth = state.store.queue_depth();
    let occupied = state
        .slots
        .lock()
        .map(|slots| slots.occupied_count())
        .unwrap_or(0);
    Json(ApiResponse::success(StatusResponse {
        queue_depth: depth,
        executing: state.tracker.executing_count(),
        occupied_slots: occupied,
        target_slots: target_slots(depth),
        pending_reruns: state.tracker.pending_rerun_count(),
        history_len: state.store.history_len(),
        current_map: state.tracker.current_map(),
    }))
}
