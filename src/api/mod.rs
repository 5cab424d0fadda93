mod router;
mod routes_client;
mod routes_commands;
mod security;
mod state;
pub mod types;

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::BrainConfig;
use crate::consumption::ConsumptionTracker;
use crate::slots::{target_slots, SlotManager};
use crate::store::{CommandStatus, CommandStore, NewCommand};
use routes_client::*;
use routes_commands::*;

pub use router::build_router;
pub use security::ApiSecurity;
pub use state::AppState;
use types::*;
