//! Operation Network Protocol
//!
//! Endpoints and DTOs for node-to-node dispatch. Payloads are JSON over HTTP;
//! a remote failure travels as a serialized `GridError` so the caller sees the
//! same variant the owner raised.

use super::types::{BackupOperation, Operation, OperationResponse};
use crate::error::GridError;
use crate::membership::types::MembershipEvent;

use serde::{Deserialize, Serialize};

// --- API Endpoints ---

/// Runs an operation on this node as the partition owner.
pub const ENDPOINT_OPERATION: &str = "/internal/operation";
/// Applies a backup effect pushed by a partition owner.
pub const ENDPOINT_BACKUP: &str = "/internal/backup";
/// Receives membership notifications from the membership service.
pub const ENDPOINT_MEMBERSHIP: &str = "/internal/membership";
/// Node summary: members, epoch, owned partitions, containers.
pub const ENDPOINT_STATS: &str = "/stats";

// --- Data Transfer Objects ---

#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub op: Operation,
}

/// Carries both outcomes with `200 OK`; non-2xx statuses mean the request never reached a handler.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub outcome: Result<OperationResponse, GridError>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BackupRequest {
    pub op: BackupOperation,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BackupResponse {
    /// `false` when the backup was a replay of one already applied.
    pub applied: bool,
    pub error: Option<GridError>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MembershipRequest {
    pub event: MembershipEvent,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MembershipResponse {
    pub changed: bool,
    pub epoch: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub node_id: String,
    pub epoch: u64,
    pub alive_members: usize,
    pub primary_partitions: usize,
    pub backup_partitions: usize,
    pub containers: usize,
}
