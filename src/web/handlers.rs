use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use uuid::Uuid;

use crate::application::BankService;
use crate::domain::AccountError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(error: AccountError) -> ApiError {
    let status = match &error {
        AccountError::NotFound => StatusCode::NOT_FOUND,
        AccountError::DuplicateAccount => StatusCode::CONFLICT,
        AccountError::InvalidAmount(_) | AccountError::InvalidArgument(_) => {
            StatusCode::BAD_REQUEST
        }
        AccountError::AccountClosed => StatusCode::CONFLICT,
        AccountError::InsufficientFunds { .. } => StatusCode::CONFLICT,
        AccountError::BadCredentials => StatusCode::UNAUTHORIZED,
        AccountError::VersionConflict { .. } => StatusCode::CONFLICT,
        AccountError::CorruptedEventLog(_) | AccountError::InfrastructureError(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

#[derive(Debug, Deserialize)]
pub struct OpenAccountRequest {
    pub full_name: String,
    pub email_address: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct OpenAccountResponse {
    pub account_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct TransactionRequest {
    pub amount_in_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub source_account_id: Uuid,
    pub target_account_id: Uuid,
    pub amount_in_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub account_id: Uuid,
    pub balance_in_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct OverdraftLimitRequest {
    pub limit_in_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct OverdraftLimitResponse {
    pub account_id: Uuid,
    pub limit_in_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct ValidatePasswordRequest {
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub email_address: String,
}

#[derive(Debug, Serialize)]
pub struct LookupResponse {
    pub account_id: Uuid,
}

/// Account view for transport; the credential digest stays server-side.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub account_id: Uuid,
    pub full_name: String,
    pub email_address: String,
    pub balance_in_cents: i64,
    pub overdraft_limit_in_cents: i64,
    pub is_closed: bool,
    pub version: i64,
}

pub async fn open_account(
    State(service): State<Arc<BankService>>,
    Json(payload): Json<OpenAccountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let account_id = service
        .open_account(&payload.full_name, &payload.email_address, &payload.password)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(OpenAccountResponse { account_id })))
}

pub async fn lookup_account_id(
    Query(query): Query<LookupQuery>,
) -> Json<LookupResponse> {
    Json(LookupResponse {
        account_id: BankService::account_id_for_email(&query.email_address),
    })
}

pub async fn get_account(
    State(service): State<Arc<BankService>>,
    Path(id): Path<Uuid>,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = service.get_account(id).await.map_err(api_error)?;
    Ok(Json(AccountResponse {
        account_id: account.id,
        full_name: account.full_name,
        email_address: account.email_address,
        balance_in_cents: account.balance,
        overdraft_limit_in_cents: account.overdraft_limit,
        is_closed: account.is_closed,
        version: account.version,
    }))
}

pub async fn get_balance(
    State(service): State<Arc<BankService>>,
    Path(id): Path<Uuid>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance_in_cents = service.get_balance(id).await.map_err(api_error)?;
    Ok(Json(BalanceResponse {
        account_id: id,
        balance_in_cents,
    }))
}

pub async fn deposit(
    State(service): State<Arc<BankService>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransactionRequest>,
) -> Result<StatusCode, ApiError> {
    service
        .deposit(id, payload.amount_in_cents)
        .await
        .map_err(api_error)?;
    Ok(StatusCode::OK)
}

pub async fn withdraw(
    State(service): State<Arc<BankService>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransactionRequest>,
) -> Result<StatusCode, ApiError> {
    service
        .withdraw(id, payload.amount_in_cents)
        .await
        .map_err(api_error)?;
    Ok(StatusCode::OK)
}

pub async fn transfer(
    State(service): State<Arc<BankService>>,
    Json(payload): Json<TransferRequest>,
) -> Result<StatusCode, ApiError> {
    service
        .transfer(
            payload.source_account_id,
            payload.target_account_id,
            payload.amount_in_cents,
        )
        .await
        .map_err(api_error)?;
    Ok(StatusCode::OK)
}

pub async fn close_account(
    State(service): State<Arc<BankService>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    service.close_account(id).await.map_err(api_error)?;
    Ok(StatusCode::OK)
}

pub async fn get_overdraft_limit(
    State(service): State<Arc<BankService>>,
    Path(id): Path<Uuid>,
) -> Result<Json<OverdraftLimitResponse>, ApiError> {
    let limit_in_cents = service.get_overdraft_limit(id).await.map_err(api_error)?;
    Ok(Json(OverdraftLimitResponse {
        account_id: id,
        limit_in_cents,
    }))
}

pub async fn set_overdraft_limit(
    State(service): State<Arc<BankService>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<OverdraftLimitRequest>,
) -> Result<StatusCode, ApiError> {
    service
        .set_overdraft_limit(id, payload.limit_in_cents)
        .await
        .map_err(api_error)?;
    Ok(StatusCode::OK)
}

pub async fn validate_password(
    State(service): State<Arc<BankService>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ValidatePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    service
        .validate_password(id, &payload.password)
        .await
        .map_err(api_error)?;
    Ok(StatusCode::OK)
}

pub async fn change_password(
    State(service): State<Arc<BankService>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    service
        .change_password(id, &payload.old_password, &payload.new_password)
        .await
        .map_err(api_error)?;
    Ok(StatusCode::OK)
}

pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

pub async fn metrics(State(service): State<Arc<BankService>>) -> Json<serde_json::Value> {
    let metrics = service.metrics();
    Json(serde_json::json!({
        "commands_processed": metrics.commands_processed.load(Ordering::Relaxed),
        "commands_failed": metrics.commands_failed.load(Ordering::Relaxed),
        "commit_retries": metrics.commit_retries.load(Ordering::Relaxed),
    }))
}
