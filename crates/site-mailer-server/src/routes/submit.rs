use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use site_mailer::pipeline::{self, SubmissionReply};
use site_mailer::{FormKind, MailerError};

use crate::AppState;
use crate::extract::read_submission;

pub async fn application(State(state): State<AppState>, req: Request) -> Response {
    submit_form(FormKind::Application, state, req).await
}

pub async fn assessment(State(state): State<AppState>, req: Request) -> Response {
    submit_form(FormKind::Assessment, state, req).await
}

pub async fn contact(State(state): State<AppState>, req: Request) -> Response {
    submit_form(FormKind::Contact, state, req).await
}

async fn submit_form(kind: FormKind, state: AppState, req: Request) -> Response {
    let submission = match read_submission(req).await {
        Ok(submission) => submission.for_kind(kind),
        Err(rejection) => return rejection.into_response(),
    };

    let config = state.config.clone();
    let client = state.client.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        pipeline::submit(kind, &submission, &config, client.as_ref())
    })
    .await;
    let result = outcome
        .unwrap_or_else(|err| Err(MailerError::internal(format!("submission worker failed: {err}"))));
    reply_response(pipeline::respond(kind, result, &state.config))
}

fn reply_response(reply: SubmissionReply) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(reply.body)).into_response()
}
