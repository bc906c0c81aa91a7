//! HTTP collaborator for the engine's web app backend.
//!
//! JSON routes (`/rows`, `/rows/{id}`, `/notify`) need the configured bearer
//! token. `GET /decision` is the link the approver clicks and is open.

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::{Context, Result};
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use ring::hmac;
use ring::rand::SystemRandom;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use tvtime_common::api::{ApiError, AppendRowResponse, RowStatusResponse};
use tvtime_common::{ApprovalNotice, Decision, LedgerSnapshot, RowId};
use tvtime_db::queries::{ApprovalNoticeQueries, ApprovalRowQueries};
use tvtime_db::{Database, DbError, DecisionOutcome};
use tvtime_engine::EngineConfig;
use url::form_urlencoded;

use super::open_sheet;
use super::rows::describe_outcome;

type Body = BoxBody<Bytes, Infallible>;

struct ServeState {
    db: Database,
    bearer: BearerCheck,
}

/// Bearer token check in constant time: both sides are compared as HMAC
/// tags under a per-process random key.
struct BearerCheck {
    key: hmac::Key,
    expected: hmac::Tag,
}

impl BearerCheck {
    fn new(token: &SecretString) -> Result<Self> {
        let key = hmac::Key::generate(hmac::HMAC_SHA256, &SystemRandom::new())
            .map_err(|_| anyhow::anyhow!("Failed to generate token key"))?;
        let expected = hmac::sign(&key, token.expose_secret().as_bytes());
        Ok(Self { key, expected })
    }

    fn accepts(&self, header: Option<&str>) -> bool {
        header.and_then(|value| value.strip_prefix("Bearer ")).is_some_and(|presented| {
            hmac::verify(&self.key, presented.as_bytes(), self.expected.as_ref()).is_ok()
        })
    }
}

pub async fn run(config: &EngineConfig, bind: &str) -> Result<()> {
    let token = config
        .approval
        .api_token
        .as_ref()
        .context("approval.api_token must be set before serving")?;
    let token = SecretString::new(token.expose_secret().into());

    let db = open_sheet(config).await?;
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind approval server on {}", bind))?;
    info!("Approval server listening on {}", listener.local_addr()?);
    println!("Serving approval rows on http://{}", listener.local_addr()?);

    serve(listener, db, token).await
}

/// Accept connections on `listener` until it fails.
pub async fn serve(listener: TcpListener, db: Database, token: SecretString) -> Result<()> {
    let state = Arc::new(ServeState { db, bearer: BearerCheck::new(&token)? });

    loop {
        let (stream, peer_addr) = listener.accept().await.context("Failed to accept connection")?;
        debug!("New connection from {}", peer_addr);

        let state = Arc::clone(&state);
        let io = TokioIo::new(stream);

        tokio::task::spawn(async move {
            let service = service_fn(move |req| handle_request(Arc::clone(&state), req));

            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                error!("Connection error: {}", err);
            }
        });
    }
}

/// A request that could not be served, rendered as an `ApiError` body.
struct Failure {
    status: StatusCode,
    message: String,
}

impl Failure {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    fn from_db(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => Self::new(StatusCode::NOT_FOUND, what),
            other => {
                error!("Approval store error: {}", other);
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "approval store unavailable")
            }
        }
    }
}

async fn handle_request(
    state: Arc<ServeState>,
    req: Request<Incoming>,
) -> Result<Response<Body>, hyper::Error> {
    debug!("Handling {} request to {}", req.method(), req.uri());

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    if method == Method::GET && segments == ["decision"] {
        let query = req.uri().query().unwrap_or_default().to_string();
        return Ok(decision_page(&state.db, &query).await);
    }

    let result = if !is_authorized(&state, &req) {
        warn!("Rejected unauthenticated {} {}", method, path);
        Err(Failure::new(StatusCode::UNAUTHORIZED, "missing or invalid bearer token"))
    } else {
        match (&method, segments.as_slice()) {
            (&Method::POST, ["rows"]) => append_row(&state.db, req).await,
            (&Method::GET, ["rows", id]) => row_status(&state.db, id).await,
            (&Method::DELETE, ["rows", id]) => withdraw_row(&state.db, id).await,
            (&Method::POST, ["notify"]) => notify(&state.db, req).await,
            _ => Err(Failure::new(StatusCode::NOT_FOUND, "no such route")),
        }
    };

    Ok(result.unwrap_or_else(|failure| {
        json_response(failure.status, &ApiError { error: failure.message })
    }))
}

fn is_authorized(state: &ServeState, req: &Request<Incoming>) -> bool {
    state.bearer.accepts(req.headers().get(AUTHORIZATION).and_then(|value| value.to_str().ok()))
}

async fn read_json<T: DeserializeOwned>(req: Request<Incoming>) -> Result<T, Failure> {
    let body = req
        .into_body()
        .collect()
        .await
        .map_err(|e| Failure::new(StatusCode::BAD_REQUEST, format!("unreadable body: {}", e)))?
        .to_bytes();

    serde_json::from_slice(&body)
        .map_err(|e| Failure::new(StatusCode::BAD_REQUEST, format!("invalid JSON: {}", e)))
}

async fn append_row(db: &Database, req: Request<Incoming>) -> Result<Response<Body>, Failure> {
    let snapshot: LedgerSnapshot = read_json(req).await?;
    let row_id = ApprovalRowQueries::append(db, &snapshot).await.map_err(Failure::from_db)?;

    info!("Row {} appended for {} ({:.1} minutes)", row_id, snapshot.child_name, snapshot.earned_minutes);
    Ok(json_response(StatusCode::CREATED, &AppendRowResponse { row_id }))
}

fn parse_row_id(id: &str) -> Result<RowId, Failure> {
    id.parse()
        .map_err(|_| Failure::new(StatusCode::BAD_REQUEST, format!("invalid row id: {}", id)))
}

async fn row_status(db: &Database, id: &str) -> Result<Response<Body>, Failure> {
    let row_id = parse_row_id(id)?;
    let status = ApprovalRowQueries::status(db, row_id).await.map_err(Failure::from_db)?;

    Ok(json_response(StatusCode::OK, &RowStatusResponse { row_id, status }))
}

/// Drop a row that was never announced. A row that is already decided is
/// left as it is.
async fn withdraw_row(db: &Database, id: &str) -> Result<Response<Body>, Failure> {
    let row_id = parse_row_id(id)?;
    if !ApprovalRowQueries::withdraw(db, row_id).await.map_err(Failure::from_db)? {
        if ApprovalRowQueries::get(db, row_id).await.map_err(Failure::from_db)?.is_none() {
            return Err(Failure::new(StatusCode::NOT_FOUND, format!("row {} not found", row_id)));
        }
        debug!("Row {} already decided, kept", row_id);
    }
    Ok(no_content())
}

async fn notify(db: &Database, req: Request<Incoming>) -> Result<Response<Body>, Failure> {
    let notice: ApprovalNotice = read_json(req).await?;

    if ApprovalRowQueries::get(db, notice.row_id).await.map_err(Failure::from_db)?.is_none() {
        return Err(Failure::new(StatusCode::NOT_FOUND, format!("row {} not found", notice.row_id)));
    }
    ApprovalNoticeQueries::create(db, &notice).await.map_err(Failure::from_db)?;

    info!("{}", notice.subject());
    println!("{}\n{}\n", notice.subject(), notice.body());

    Ok(no_content())
}

/// Apply the decision named in `?action=&row=` and render the result page.
async fn decision_page(db: &Database, query: &str) -> Response<Body> {
    let mut action = None;
    let mut row = None;
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "action" => action = Some(value.into_owned()),
            "row" => row = Some(value.into_owned()),
            _ => {}
        }
    }

    let decision = action.as_deref().map(str::parse::<Decision>);
    let row_id = row.as_deref().map(str::parse::<RowId>);

    let (decision, row_id) = match (decision, row_id) {
        (Some(Ok(decision)), Some(Ok(row_id))) => (decision, row_id),
        _ => {
            return html_response(
                StatusCode::BAD_REQUEST,
                "Invalid link",
                "This link is missing a valid action or row.",
            )
        }
    };

    match ApprovalRowQueries::apply_decision(db, row_id, decision).await {
        Ok(outcome) => {
            let status = match outcome {
                DecisionOutcome::Conflict { .. } => StatusCode::CONFLICT,
                _ => StatusCode::OK,
            };
            let title = match decision {
                Decision::Approve => "TV Time approved",
                Decision::Reject => "TV Time rejected",
            };
            html_response(status, title, &describe_outcome(row_id, outcome))
        }
        Err(DbError::NotFound(_)) => {
            html_response(StatusCode::NOT_FOUND, "Unknown request", &format!("Row {} does not exist.", row_id))
        }
        Err(e) => {
            error!("Failed to record decision for row {}: {}", row_id, e);
            html_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Something went wrong",
                "The decision could not be recorded. Please try again.",
            )
        }
    }
}

fn no_content() -> Response<Body> {
    let mut response = Response::new(Empty::<Bytes>::new().map_err(|never| match never {}).boxed());
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
}

fn full(bytes: impl Into<Bytes>) -> Body {
    Full::new(bytes.into()).map_err(|never| match never {}).boxed()
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    let bytes = serde_json::to_vec(body)
        .unwrap_or_else(|_| br#"{"error":"response encoding failed"}"#.to_vec());

    let mut response = Response::new(full(bytes));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn html_response(status: StatusCode, title: &str, message: &str) -> Response<Body> {
    let page = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>{title}</title>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 40px; background: #f5f5f5; }}
        .container {{ background: white; padding: 30px; border-radius: 8px; }}
    </style>
</head>
<body>
    <div class="container">
        <h1>{title}</h1>
        <p>{message}</p>
    </div>
</body>
</html>"#
    );

    let mut response = Response::new(full(page));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
    response
}
