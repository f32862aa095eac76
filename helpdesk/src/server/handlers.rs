//! Ticket endpoints.
//!
//! - POST /api/v1/tickets - Open a ticket for the caller
//! - GET /api/v1/tickets - The caller's tickets
//! - GET /api/v1/tickets/:id - One ticket (owner or agent)
//! - PUT /api/v1/tickets/:id - Agent update or customer edit
//! - GET /api/v1/agent/tickets - Every ticket (agents only)

use super::{ApiError, AppState, Caller};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use helpdesk_core::model::{CustomerPatch, NewTicket, Ticket, TicketId, TicketPatch, TicketStatus};
use serde::Deserialize;

/// Body of `PUT /api/v1/tickets/:id`.
///
/// Agents may send any field; customers may not send `status`.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTicketRequest {
    /// New title
    pub title: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New status (agents only)
    pub status: Option<TicketStatus>,
}

fn parse_id(raw: &str) -> Result<TicketId, ApiError> {
    raw.parse().map_err(|_| ApiError::bad_request("invalid ID"))
}

/// Open a ticket owned by the caller.
///
/// # Errors
///
/// 400 if title or description is too short.
pub async fn create_ticket(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<NewTicket>,
) -> Result<(StatusCode, Json<Ticket>), ApiError> {
    let ticket = state.tickets.create(request, caller.user_id).await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

/// Tickets owned by the caller.
///
/// # Errors
///
/// 500 if the store is unavailable.
pub async fn list_my_tickets(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<Ticket>>, ApiError> {
    Ok(Json(state.tickets.list_by_user(caller.user_id).await?))
}

/// One ticket. Customers only see their own.
///
/// # Errors
///
/// 400 for a malformed id, 403 for another customer's ticket, 404 if absent.
pub async fn get_ticket(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Ticket>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.tickets.get_by_id(id, caller.reader()).await?))
}

/// Agents update any field; customers edit title and description of their own
/// ticket until an agent picks it up.
///
/// # Errors
///
/// 400 for a malformed id, 403 when a customer sends `status` or edits
/// another customer's ticket, 404 if absent, 409 once an agent is assigned.
pub async fn update_ticket(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(request): Json<UpdateTicketRequest>,
) -> Result<Json<Ticket>, ApiError> {
    let id = parse_id(&id)?;

    let ticket = if caller.is_agent() {
        let patch = TicketPatch {
            title: request.title,
            description: request.description,
            status: request.status,
        };
        state
            .tickets
            .update(id, &patch, caller.user_id, caller.role)
            .await?
    } else {
        if request.status.is_some() {
            return Err(ApiError::forbidden("only agents can update ticket status"));
        }
        let patch = CustomerPatch {
            title: request.title,
            description: request.description,
        };
        state.tickets.customer_update(id, &patch, caller.user_id).await?
    };

    Ok(Json(ticket))
}

/// Every ticket.
///
/// # Errors
///
/// 403 unless the caller is an agent.
pub async fn list_all_tickets(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<Ticket>>, ApiError> {
    if !caller.is_agent() {
        return Err(ApiError::forbidden("Forbidden: Agent role required"));
    }
    Ok(Json(state.tickets.list_all().await?))
}
