//! `/api/v1/costs` HTTP surface.
//!
//! Identity arrives in trusted `x-actor-*` headers set by the authentication
//! gateway. Route guards here are coarse [`AccessPolicy`] checks; which
//! approval gate a caller may pass is decided by the workflow's rule table.

use axum::{
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Path, Request, State},
    http::{request::Parts, Extensions, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use costgate_core::domain::actor::{AccessPolicy, Actor, Role};
use costgate_core::domain::cost::{CostRequest, CostRequestId, NewCostRequest};
use costgate_core::errors::{ApplicationError, InterfaceError};
use costgate_core::ledger::SyncReport;
use costgate_core::workflow::{ActorContext, CostWorkflow};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const ACTOR_PERMISSIONS_HEADER: &str = "x-actor-permissions";
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct CostsState {
    workflow: CostWorkflow,
}

pub fn router(workflow: CostWorkflow) -> Router {
    Router::new()
        .route("/", post(create_cost_request).get(list_all_cost_requests))
        .route("/mine", get(list_my_cost_requests))
        .route("/pending-approvals", get(list_pending_approvals))
        .route("/sync-ledger", post(sync_ledger))
        .route("/{id}", get(get_cost_request))
        .route("/{id}/approve", post(approve_cost_request))
        .route("/{id}/reject", post(reject_cost_request))
        .route("/{id}/check-number", post(add_check_number))
        .with_state(CostsState { workflow })
}

#[derive(Clone, Debug, Serialize)]
pub struct ApiSuccess<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

fn ok<T>(message: impl Into<String>, data: T) -> Json<ApiSuccess<T>> {
    Json(ApiSuccess { success: true, message: message.into(), data })
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiFailure {
    pub success: bool,
    pub error: String,
    pub correlation_id: String,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized { message: String, correlation_id: String },
    Forbidden { correlation_id: String },
    Interface(InterfaceError),
}

impl ApiError {
    fn from_application(error: ApplicationError, correlation_id: &str) -> Self {
        Self::Interface(error.into_interface(correlation_id))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, correlation_id) = match self {
            Self::Unauthorized { message, correlation_id } => {
                (StatusCode::UNAUTHORIZED, message, correlation_id)
            }
            Self::Forbidden { correlation_id } => (
                StatusCode::FORBIDDEN,
                "You do not have permission to perform this action".to_string(),
                correlation_id,
            ),
            Self::Interface(interface) => {
                let status = match interface {
                    InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
                    InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
                    InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
                    InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                };
                // Storage and configuration details stay in the logs.
                let error = match interface {
                    InterfaceError::ServiceUnavailable { .. } | InterfaceError::Internal { .. } => {
                        warn!(
                            event_name = "http.request.failed",
                            correlation_id = %interface.correlation_id(),
                            error = %interface,
                            "request failed with a server-side error"
                        );
                        interface.user_message().to_string()
                    }
                    _ => interface.message().to_string(),
                };
                (status, error, interface.correlation_id().to_string())
            }
        };

        (status, Json(ApiFailure { success: false, error, correlation_id })).into_response()
    }
}

/// Authenticated caller plus the correlation id for this request.
#[derive(Clone, Debug)]
pub struct RequestActor {
    pub actor: Actor,
    pub correlation_id: String,
}

impl RequestActor {
    fn context(&self) -> ActorContext {
        ActorContext::new(self.actor.id.clone(), self.correlation_id.clone())
    }

    fn require(&self, policy: AccessPolicy) -> Result<(), ApiError> {
        if policy.allows(&self.actor) {
            return Ok(());
        }
        warn!(
            event_name = "http.request.forbidden",
            correlation_id = %self.correlation_id,
            actor = %self.actor.id,
            role = self.actor.role.as_str(),
            "actor failed route access policy"
        );
        Err(ApiError::Forbidden { correlation_id: self.correlation_id.clone() })
    }
}

impl<S> FromRequestParts<S> for RequestActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = header_value(&parts.headers, CORRELATION_ID_HEADER)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        parts.extensions.insert(CorrelationId(correlation_id.clone()));
        let unauthorized = |message: &str| ApiError::Unauthorized {
            message: message.to_string(),
            correlation_id: correlation_id.clone(),
        };

        let id = header_value(&parts.headers, ACTOR_ID_HEADER)
            .ok_or_else(|| unauthorized("Authentication required"))?;
        let role = header_value(&parts.headers, ACTOR_ROLE_HEADER)
            .ok_or_else(|| unauthorized("Authentication required"))?
            .parse::<Role>()
            .map_err(|_| unauthorized("Unrecognized actor role"))?;
        let permissions = match header_value(&parts.headers, ACTOR_PERMISSIONS_HEADER) {
            Some(raw) => Actor::parse_permissions(raw),
            None => Default::default(),
        };

        Ok(Self { actor: Actor::new(id, role, permissions), correlation_id })
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Correlation id chosen by [`RequestActor`], shared with the body extractors.
#[derive(Clone, Debug)]
struct CorrelationId(String);

fn correlation_id(extensions: &Extensions, headers: &HeaderMap) -> String {
    extensions
        .get::<CorrelationId>()
        .map(|id| id.0.clone())
        .or_else(|| header_value(headers, CORRELATION_ID_HEADER).map(str::to_string))
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn malformed_body(detail: String, correlation_id: String) -> ApiError {
    ApiError::Interface(InterfaceError::BadRequest {
        message: format!("invalid request body: {detail}"),
        correlation_id,
    })
}

/// JSON body whose rejections use the error envelope.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = correlation_id(req.extensions(), req.headers());
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(malformed_body(rejection.body_text(), correlation_id)),
        }
    }
}

/// Like [`JsonBody`], but an empty body yields `T::default()`.
#[derive(Debug)]
pub struct OptionalJsonBody<T>(pub T);

impl<S, T> FromRequest<S> for OptionalJsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Default,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = correlation_id(req.extensions(), req.headers());
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| malformed_body(rejection.body_text(), correlation_id.clone()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(T::default()));
        }
        Json::<T>::from_bytes(&bytes)
            .map(|Json(value)| Self(value))
            .map_err(|rejection| malformed_body(rejection.body_text(), correlation_id))
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ApproveBody {
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RejectBody {
    pub reason: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CheckNumberBody {
    pub check_number: String,
}

type ApiResult<T> = Result<Json<ApiSuccess<T>>, ApiError>;

async fn create_cost_request(
    State(state): State<CostsState>,
    caller: RequestActor,
    JsonBody(body): JsonBody<NewCostRequest>,
) -> Result<(StatusCode, Json<ApiSuccess<CostRequest>>), ApiError> {
    caller.require(AccessPolicy::submitters())?;
    let created = state
        .workflow
        .create(&caller.context(), body)
        .await
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))?;
    Ok((StatusCode::CREATED, ok("Cost request submitted successfully", created)))
}

async fn list_all_cost_requests(
    State(state): State<CostsState>,
    caller: RequestActor,
) -> ApiResult<Vec<CostRequest>> {
    caller.require(AccessPolicy::admin_only())?;
    let requests = state
        .workflow
        .list_all()
        .await
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))?;
    Ok(ok("Cost requests retrieved successfully", requests))
}

async fn list_my_cost_requests(
    State(state): State<CostsState>,
    caller: RequestActor,
) -> ApiResult<Vec<CostRequest>> {
    caller.require(AccessPolicy::authenticated())?;
    let requests = state
        .workflow
        .list_mine(&caller.actor.id)
        .await
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))?;
    Ok(ok("Your cost requests retrieved successfully", requests))
}

async fn list_pending_approvals(
    State(state): State<CostsState>,
    caller: RequestActor,
) -> ApiResult<Vec<CostRequest>> {
    caller.require(AccessPolicy::approvers())?;
    let requests = state
        .workflow
        .list_pending_approvals(&caller.actor.permissions)
        .await
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))?;
    Ok(ok("Pending approvals retrieved successfully", requests))
}

async fn get_cost_request(
    State(state): State<CostsState>,
    caller: RequestActor,
    Path(id): Path<String>,
) -> ApiResult<CostRequest> {
    caller.require(AccessPolicy::authenticated())?;
    let request = state
        .workflow
        .get(&CostRequestId(id))
        .await
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))?;
    Ok(ok("Cost request retrieved successfully", request))
}

async fn approve_cost_request(
    State(state): State<CostsState>,
    caller: RequestActor,
    Path(id): Path<String>,
    OptionalJsonBody(body): OptionalJsonBody<ApproveBody>,
) -> ApiResult<CostRequest> {
    caller.require(AccessPolicy::approvers())?;
    let request = state
        .workflow
        .approve(&CostRequestId(id), &caller.context(), &caller.actor.permissions, body.comment)
        .await
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))?;
    Ok(ok("Cost request approved successfully", request))
}

async fn reject_cost_request(
    State(state): State<CostsState>,
    caller: RequestActor,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<RejectBody>,
) -> ApiResult<CostRequest> {
    caller.require(AccessPolicy::approvers())?;
    let request = state
        .workflow
        .reject(&CostRequestId(id), &caller.context(), body.reason)
        .await
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))?;
    Ok(ok("Cost request rejected", request))
}

async fn add_check_number(
    State(state): State<CostsState>,
    caller: RequestActor,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<CheckNumberBody>,
) -> ApiResult<CostRequest> {
    caller.require(AccessPolicy::admin_only())?;
    let request = state
        .workflow
        .add_check_number(&CostRequestId(id), &caller.context(), &body.check_number)
        .await
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))?;
    Ok(ok("Check number added successfully", request))
}

async fn sync_ledger(
    State(state): State<CostsState>,
    caller: RequestActor,
) -> ApiResult<SyncReport> {
    caller.require(AccessPolicy::admin_only())?;
    let report = state
        .workflow
        .sync_approved_to_ledger(&caller.context())
        .await
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))?;
    Ok(ok(
        format!("Synced {} approved cost requests to the ledger", report.synced_count),
        report,
    ))
}
