use std::collections::BTreeMap;
use std::sync::Arc;

use actix_web::{delete, get, post, web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::{check_identity, issue_credential};
use crate::balance::{summarize, Balance};
use crate::error::{LedgerError, ValidationError};
use crate::payment::PaymentRail;
use crate::schemas::SplitMethod;
use crate::service::{self, NewExpenseRequest, NewGroupRequest};
use crate::session::{Session, SessionRegistry};
use crate::settlement::{Phase, Settlement};
use crate::store::LedgerStore;

pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub rail: Arc<dyn PaymentRail>,
    pub sessions: SessionRegistry,
    pub session_secret: String,
    pub transaction_fee: f64,
}

#[derive(Deserialize, Serialize)]
struct ConnectJson {
    address: String,
}

#[derive(Deserialize, Serialize)]
struct ParticipantJson {
    address: String,
}

#[derive(Deserialize)]
struct ExpenseJson {
    description: String,
    amount: f64,
    paid_by: String,
    split_method: SplitMethod,
    participants: Vec<String>,
    #[serde(default)]
    custom_amounts: Option<BTreeMap<String, f64>>,
}

#[derive(Serialize)]
struct SettlementView<'a> {
    phase: Phase,
    settlement: Option<&'a Settlement>,
    total: Option<f64>,
}

/// Resolves the connected session behind the request's wallet credential.
fn current_session(request: &HttpRequest, state: &AppState) -> Result<Arc<Session>, LedgerError> {
    let identity =
        check_identity(request, &state.session_secret).ok_or(LedgerError::Unauthorized)?;
    state.sessions.get(&identity).ok_or(LedgerError::NotConnected)
}

fn settlement_view(session: &Session) -> HttpResponse {
    let desk = session.desk();
    let settlement = desk.current();
    HttpResponse::Ok().json(SettlementView {
        phase: desk.phase(),
        settlement,
        total: settlement.map(Settlement::total),
    })
}

#[post("/session")]
async fn connect(
    state: web::Data<AppState>,
    json: web::Json<ConnectJson>,
) -> Result<HttpResponse, LedgerError> {
    let address = json.into_inner().address.trim().to_string();
    if address.is_empty() {
        return Err(ValidationError::EmptyIdentity.into());
    }
    state.sessions.connect(&address, state.transaction_fee);
    Ok(HttpResponse::Ok().json(json!({
        "address": address,
        "credential": issue_credential(&address, &state.session_secret),
    })))
}

#[get("/session")]
async fn session_status(state: web::Data<AppState>, request: HttpRequest) -> HttpResponse {
    let session = current_session(&request, &state).ok();
    HttpResponse::Ok().json(json!({
        "connected": session.is_some(),
        "address": session.as_ref().map(|s| s.identity()),
        "connected_at": session.as_ref().map(|s| s.connected_at()),
    }))
}

#[delete("/session")]
async fn disconnect(
    state: web::Data<AppState>,
    request: HttpRequest,
) -> Result<HttpResponse, LedgerError> {
    let session = current_session(&request, &state)?;
    state.sessions.disconnect(session.identity());
    Ok(HttpResponse::Ok().body("Wallet disconnected"))
}

#[post("/groups")]
async fn add_group(
    state: web::Data<AppState>,
    request: HttpRequest,
    json: web::Json<NewGroupRequest>,
) -> Result<HttpResponse, LedgerError> {
    let session = current_session(&request, &state)?;
    let group =
        service::create_group(state.store.as_ref(), session.identity(), json.into_inner()).await?;
    Ok(HttpResponse::Created().json(group))
}

#[get("/groups")]
async fn get_groups(
    state: web::Data<AppState>,
    request: HttpRequest,
) -> Result<HttpResponse, LedgerError> {
    let session = current_session(&request, &state)?;
    let groups = service::list_groups(state.store.as_ref(), session.identity()).await?;
    Ok(HttpResponse::Ok().json(groups))
}

#[post("/groups/{id}/participants")]
async fn add_participant(
    state: web::Data<AppState>,
    request: HttpRequest,
    id: web::Path<String>,
    json: web::Json<ParticipantJson>,
) -> Result<HttpResponse, LedgerError> {
    let session = current_session(&request, &state)?;
    let group = service::add_participant(
        state.store.as_ref(),
        session.identity(),
        &id.into_inner(),
        &json.into_inner().address,
    )
    .await?;
    Ok(HttpResponse::Ok().json(group))
}

#[post("/groups/{id}/expenses")]
async fn add_expense(
    state: web::Data<AppState>,
    request: HttpRequest,
    id: web::Path<String>,
    expense: web::Json<ExpenseJson>,
) -> Result<HttpResponse, LedgerError> {
    let session = current_session(&request, &state)?;
    let expense = expense.into_inner();
    let record = service::add_expense(
        state.store.as_ref(),
        session.identity(),
        NewExpenseRequest {
            group_id: id.into_inner(),
            description: expense.description,
            amount: expense.amount,
            paid_by: expense.paid_by,
            split_method: expense.split_method,
            participants: expense.participants,
            custom_amounts: expense.custom_amounts,
        },
    )
    .await?;
    Ok(HttpResponse::Created().json(record))
}

#[get("/groups/{id}/balance")]
async fn get_group_balance(
    state: web::Data<AppState>,
    request: HttpRequest,
    id: web::Path<String>,
) -> Result<HttpResponse, LedgerError> {
    let session = current_session(&request, &state)?;
    let balances =
        service::group_balances(state.store.as_ref(), session.identity(), &id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(balances))
}

#[get("/balances")]
async fn get_balances(
    state: web::Data<AppState>,
    request: HttpRequest,
) -> Result<HttpResponse, LedgerError> {
    let session = current_session(&request, &state)?;
    let balances = service::refresh_balances(state.store.as_ref(), &session).await?;
    Ok(HttpResponse::Ok().json(json!({
        "summary": summarize(session.identity(), &balances),
        "balances": balances,
    })))
}

#[get("/settlement")]
async fn get_settlement(
    state: web::Data<AppState>,
    request: HttpRequest,
) -> Result<HttpResponse, LedgerError> {
    let session = current_session(&request, &state)?;
    Ok(settlement_view(&session))
}

#[post("/settlement")]
async fn initiate_settlement(
    state: web::Data<AppState>,
    request: HttpRequest,
    balance: web::Json<Balance>,
) -> Result<HttpResponse, LedgerError> {
    let session = current_session(&request, &state)?;
    session
        .desk()
        .initiate(session.identity(), balance.into_inner())?;
    Ok(settlement_view(&session))
}

#[post("/settlement/confirm")]
async fn confirm_settlement(
    state: web::Data<AppState>,
    request: HttpRequest,
) -> Result<HttpResponse, LedgerError> {
    let session = current_session(&request, &state)?;
    service::pay(state.rail.as_ref(), &session).await?;
    Ok(settlement_view(&session))
}

#[post("/settlement/retry")]
async fn retry_settlement(
    state: web::Data<AppState>,
    request: HttpRequest,
) -> Result<HttpResponse, LedgerError> {
    let session = current_session(&request, &state)?;
    service::retry(state.rail.as_ref(), &session).await?;
    Ok(settlement_view(&session))
}

#[post("/settlement/finish")]
async fn finish_settlement(
    state: web::Data<AppState>,
    request: HttpRequest,
) -> Result<HttpResponse, LedgerError> {
    let session = current_session(&request, &state)?;
    let settled = session.desk().finish()?;
    let desk = session.desk();
    Ok(HttpResponse::Ok().json(json!({
        "settled": settled,
        "balances": desk.balances(),
    })))
}

#[delete("/settlement")]
async fn cancel_settlement(
    state: web::Data<AppState>,
    request: HttpRequest,
) -> Result<HttpResponse, LedgerError> {
    let session = current_session(&request, &state)?;
    session.desk().cancel()?;
    Ok(settlement_view(&session))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(connect)
        .service(session_status)
        .service(disconnect)
        .service(add_group)
        .service(get_groups)
        .service(add_participant)
        .service(add_expense)
        .service(get_group_balance)
        .service(get_balances)
        .service(get_settlement)
        .service(initiate_settlement)
        .service(confirm_settlement)
        .service(retry_settlement)
        .service(finish_settlement)
        .service(cancel_settlement);
}
