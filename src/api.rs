//! REST surface of the ledger, mounted under `/api`.
//!
//! Every route needs a valid token in the `Authorization` header and, for
//! group routes, the caller has to be a member of the group.
use actix_web::{
    delete, get,
    http::StatusCode,
    post, web, HttpRequest, HttpResponse, ResponseError,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::analytics::summarize;
use crate::auth::{authenticate, AuthError, TokenVerifier};
use crate::balance::compute_balance_from_group;
use crate::error::LedgerError;
use crate::exchange::get_exchanges_from_balance;
use crate::ledger::{Ledger, NewExpense, NewPayment};
use crate::report::expenses_csv;
use crate::schemas::{ExpenseFilter, Member, MemberId};

pub struct AppState {
    pub ledger: Ledger,
    pub verifier: Arc<dyn TokenVerifier>,
}

impl AppState {
    fn caller(&self, request: &HttpRequest) -> Result<MemberId, ApiError> {
        Ok(authenticate(request, self.verifier.as_ref())?)
    }
}

#[derive(Debug)]
pub enum ApiError {
    Ledger(LedgerError),
    Auth(AuthError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Ledger(err) => write!(f, "{err}"),
            ApiError::Auth(err) => write!(f, "{err}"),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(value: LedgerError) -> Self {
        Self::Ledger(value)
    }
}

impl From<AuthError> for ApiError {
    fn from(value: AuthError) -> Self {
        Self::Auth(value)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Ledger(LedgerError::Validation(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Ledger(LedgerError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Ledger(LedgerError::Conflict(_)) => StatusCode::CONFLICT,
            ApiError::Ledger(LedgerError::Forbidden(_)) => StatusCode::FORBIDDEN,
            ApiError::Ledger(LedgerError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error = match self {
            ApiError::Ledger(LedgerError::Storage(detail)) => {
                tracing::error!("storage error: {detail}");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(ErrorBody { error })
    }
}

type ApiResult = Result<HttpResponse, ApiError>;

#[derive(Deserialize)]
pub struct NewGroup {
    pub name: String,
    /// Display name of the caller, who becomes the owner.
    pub member_name: String,
}

#[derive(Deserialize)]
pub struct AnalyticsQuery {
    pub since: Option<NaiveDate>,
}

#[post("/groups")]
async fn create_group(
    state: web::Data<AppState>,
    request: HttpRequest,
    json: web::Json<NewGroup>,
) -> ApiResult {
    let caller = state.caller(&request)?;
    let json = json.into_inner();
    let owner = Member {
        id: caller,
        name: json.member_name,
    };
    let group = state.ledger.create_group(&json.name, owner).await?;
    Ok(HttpResponse::Created().json(group))
}

#[get("/groups")]
async fn list_groups(state: web::Data<AppState>, request: HttpRequest) -> ApiResult {
    let caller = state.caller(&request)?;
    Ok(HttpResponse::Ok().json(state.ledger.groups_for_member(&caller).await?))
}

#[get("/groups/{id}")]
async fn get_group(state: web::Data<AppState>, request: HttpRequest, id: web::Path<String>) -> ApiResult {
    let caller = state.caller(&request)?;
    let ledger = state.ledger.snapshot_for(&id, &caller).await?;
    Ok(HttpResponse::Ok().json(ledger.group))
}

#[delete("/groups/{id}")]
async fn delete_group(
    state: web::Data<AppState>,
    request: HttpRequest,
    id: web::Path<String>,
) -> ApiResult {
    let caller = state.caller(&request)?;
    let ledger = state.ledger.snapshot_for(&id, &caller).await?;
    if ledger.group.owner != caller {
        return Err(LedgerError::Forbidden("only the owner can delete a group".to_string()).into());
    }
    state.ledger.delete_group(&id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/groups/{id}/members")]
async fn add_member(
    state: web::Data<AppState>,
    request: HttpRequest,
    id: web::Path<String>,
    member: web::Json<Member>,
) -> ApiResult {
    let caller = state.caller(&request)?;
    state.ledger.snapshot_for(&id, &caller).await?;
    let group = state.ledger.add_member(&id, member.into_inner()).await?;
    Ok(HttpResponse::Created().json(group))
}

#[post("/groups/{id}/expenses")]
async fn add_expense(
    state: web::Data<AppState>,
    request: HttpRequest,
    id: web::Path<String>,
    expense: web::Json<NewExpense>,
) -> ApiResult {
    let caller = state.caller(&request)?;
    state.ledger.snapshot_for(&id, &caller).await?;
    let expense = state.ledger.add_expense(&id, expense.into_inner()).await?;
    Ok(HttpResponse::Created().json(expense))
}

#[get("/groups/{id}/expenses")]
async fn list_expenses(
    state: web::Data<AppState>,
    request: HttpRequest,
    id: web::Path<String>,
    filter: web::Query<ExpenseFilter>,
) -> ApiResult {
    let caller = state.caller(&request)?;
    let ledger = state.ledger.snapshot_for(&id, &caller).await?;
    Ok(HttpResponse::Ok().json(ledger.filtered_expenses(&filter)))
}

#[post("/groups/{id}/payments")]
async fn record_payment(
    state: web::Data<AppState>,
    request: HttpRequest,
    id: web::Path<String>,
    payment: web::Json<NewPayment>,
) -> ApiResult {
    let caller = state.caller(&request)?;
    state.ledger.snapshot_for(&id, &caller).await?;
    let payment = state.ledger.record_payment(&id, payment.into_inner()).await?;
    Ok(HttpResponse::Created().json(payment))
}

#[get("/groups/{id}/payments")]
async fn list_payments(
    state: web::Data<AppState>,
    request: HttpRequest,
    id: web::Path<String>,
) -> ApiResult {
    let caller = state.caller(&request)?;
    let ledger = state.ledger.snapshot_for(&id, &caller).await?;
    Ok(HttpResponse::Ok().json(ledger.payments_by_date()))
}

#[get("/groups/{id}/balances")]
async fn get_balances(
    state: web::Data<AppState>,
    request: HttpRequest,
    id: web::Path<String>,
) -> ApiResult {
    let caller = state.caller(&request)?;
    let ledger = state.ledger.snapshot_for(&id, &caller).await?;
    Ok(HttpResponse::Ok().json(compute_balance_from_group(&ledger)?))
}

#[get("/groups/{id}/settlement")]
async fn get_settlement(
    state: web::Data<AppState>,
    request: HttpRequest,
    id: web::Path<String>,
) -> ApiResult {
    let caller = state.caller(&request)?;
    let ledger = state.ledger.snapshot_for(&id, &caller).await?;
    let balance = compute_balance_from_group(&ledger)?;
    Ok(HttpResponse::Ok().json(get_exchanges_from_balance(&balance)))
}

#[get("/groups/{id}/analytics")]
async fn get_analytics(
    state: web::Data<AppState>,
    request: HttpRequest,
    id: web::Path<String>,
    query: web::Query<AnalyticsQuery>,
) -> ApiResult {
    let caller = state.caller(&request)?;
    let ledger = state.ledger.snapshot_for(&id, &caller).await?;
    Ok(HttpResponse::Ok().json(summarize(&ledger, query.since)?))
}

#[get("/groups/{id}/report.csv")]
async fn get_report(
    state: web::Data<AppState>,
    request: HttpRequest,
    id: web::Path<String>,
    filter: web::Query<ExpenseFilter>,
) -> ApiResult {
    let caller = state.caller(&request)?;
    let ledger = state.ledger.snapshot_for(&id, &caller).await?;
    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .body(expenses_csv(&ledger, &caller, &filter)?))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(create_group)
            .service(list_groups)
            .service(get_group)
            .service(delete_group)
            .service(add_member)
            .service(add_expense)
            .service(list_expenses)
            .service(record_payment)
            .service(list_payments)
            .service(get_balances)
            .service(get_settlement)
            .service(get_analytics)
            .service(get_report),
    );
}
