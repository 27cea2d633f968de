//! Participant-facing HTML pages.
//!
//! Plain server-rendered forms, no client script beyond the slider readout.
//! Every form posts back to its flow and is answered with a redirect, so a
//! reload never re-submits a rating.

use std::fmt::Write as _;
use std::sync::Arc;

use axum::extract::{Form, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use pygmalion_core::SessionId;
use pygmalion_flow::FlowError;
use serde::Deserialize;
use time::macros::format_description;
use time::OffsetDateTime;

use super::registry::{self, FlowMode, FlowState, FlowView, ScenarioView, Started};
use super::state::AppState;

const PAGE_SUFFIX: &str = "Bias-Experiment";

const SAVE_FAILED: &str = "Es gab ein Problem beim Speichern. Bitte versuche es erneut.";

const STYLE: &str = "body{margin:0;font-family:system-ui,sans-serif;background:#f8fafc;color:#0f172a}\
main{max-width:28rem;margin:0 auto;padding:2.5rem 1.5rem}\
h1{text-align:center;font-size:1.5rem;font-weight:600}\
h2{text-align:center;font-size:1.125rem;font-weight:500}\
.muted{color:#64748b;text-align:center}\
.card{background:#fff;border:1px solid #e2e8f0;border-radius:1rem;padding:1.25rem;margin:1.5rem 0}\
.card small{display:block;color:#64748b;margin-bottom:.25rem}\
.progress{height:.25rem;background:#e2e8f0;border-radius:1rem;overflow:hidden}\
.progress div{height:100%;background:#2563eb}\
figure{margin:0 0 1.5rem;border-radius:1rem;overflow:hidden;border:1px solid #e2e8f0}\
figure img{display:block;width:100%}\
input[type=range]{width:100%}\
input[type=text]{width:100%;box-sizing:border-box;padding:.75rem;border:1px solid #cbd5e1;border-radius:.75rem}\
.scale{display:flex;justify-content:space-between;font-size:.75rem;color:#94a3b8}\
.value{text-align:center;font-size:2rem;font-weight:600;color:#2563eb;margin-top:1.5rem}\
.warn{text-align:center;color:#d97706}\
.error{text-align:center;color:#dc2626;background:#fef2f2;border:1px solid #fecaca;border-radius:.75rem;padding:1rem}\
button,.button{display:block;width:100%;box-sizing:border-box;padding:1rem;border:0;border-radius:1rem;\
background:#2563eb;color:#fff;font-size:1rem;text-align:center;text-decoration:none;cursor:pointer}\
button:disabled{background:#60a5fa;cursor:not-allowed}\
.session{margin-top:2rem;text-align:center;font-size:.75rem;color:#cbd5e1}";

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PlayQuery {
    #[serde(default)]
    session: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RatingForm {
    /// Absent when nothing is selected.
    #[serde(default)]
    rating: Option<String>,
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// GET /
pub(crate) async fn handle_start_page(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(start_page(&today(), state.catalog.len()))
}

/// GET /play
pub(crate) async fn handle_play(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PlayQuery>,
) -> Redirect {
    let session = SessionId::resolve(query.session.as_deref());
    let id = state
        .flows
        .start_multi(&state.catalog, session, state.assigner.as_ref())
        .await;
    Redirect::to(&format!("/flows/{}", id))
}

/// GET /play/{scenario_id}
pub(crate) async fn handle_play_scenario(
    State(state): State<Arc<AppState>>,
    Path(scenario_id): Path<String>,
    Query(query): Query<PlayQuery>,
) -> Response {
    let session = SessionId::resolve(query.session.as_deref());
    match state
        .flows
        .start_single(&state.catalog, &scenario_id, session, state.assigner.as_ref())
        .await
    {
        Started::Created(id) => Redirect::to(&format!("/flows/{}", id)).into_response(),
        Started::NotFound { requested } => {
            (StatusCode::NOT_FOUND, Html(scenario_not_found_page(&requested))).into_response()
        }
    }
}

/// GET /flows/{id}
pub(crate) async fn handle_flow_page(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let Some(slot) = state.flows.get(&id).await else {
        return (StatusCode::NOT_FOUND, Html(flow_not_found_page())).into_response();
    };
    let view = slot.lock().await.flow.view(&id);
    Html(flow_page(&view)).into_response()
}

/// POST /flows/{id}
pub(crate) async fn handle_flow_form(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Form(form): Form<RatingForm>,
) -> Response {
    let Some(slot) = state.flows.get(&id).await else {
        return (StatusCode::NOT_FOUND, Html(flow_not_found_page())).into_response();
    };
    let back = Redirect::to(&format!("/flows/{}", id));

    {
        let mut guard = slot.lock().await;
        guard.touch();
        if !guard.flow.awaiting_retry() {
            let rating = form
                .rating
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .and_then(|r| r.parse::<i32>().ok());
            let result = match rating {
                Some(rating) => guard.flow.set_rating(rating),
                None => guard.flow.clear_rating(),
            };
            match result {
                Ok(()) => {}
                Err(e @ FlowError::RatingOutOfRange { .. }) => {
                    tracing::debug!(flow = %id, error = %e, "ignoring form rating");
                    return back.into_response();
                }
                // Busy or finished: the page shows why.
                Err(_) => return back.into_response(),
            }
        }
    }

    if let Err(e) = registry::submit(&slot, state.sink.clone()).await {
        tracing::debug!(flow = %id, error = %e, "form submit refused");
    }
    back.into_response()
}

// ── Rendering ─────────────────────────────────────────────────────────────────

fn today() -> String {
    let date = OffsetDateTime::now_utc().date();
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string())
}

fn layout(title: &str, head_extra: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"de\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{} | {}</title>\n{}<style>{}</style>\n</head>\n<body>\n<main>\n{}</main>\n</body>\n</html>\n",
        escape_html(title),
        PAGE_SUFFIX,
        head_extra,
        STYLE,
        body
    )
}

pub(crate) fn start_page(today: &str, scenario_count: usize) -> String {
    let body = format!(
        "<h1>Bias-Experiment</h1>\n\
         <p class=\"muted\">Demonstration des Erwartungseffekts</p>\n\
         <form method=\"get\" action=\"/play\" class=\"card\">\n\
         <label for=\"session\"><small>Session-ID</small></label>\n\
         <input id=\"session\" name=\"session\" type=\"text\" value=\"{}\" placeholder=\"z.B. seminar-2025-12-10\">\n\
         <p class=\"muted\"><small>Gleiche Session-ID = Antworten werden gruppiert</small></p>\n\
         <button type=\"submit\">{} Szenarien nacheinander</button>\n\
         </form>\n\
         <p class=\"muted\"><small>Teile den Link mit deiner Gruppe (z.B. als QR-Code).</small></p>\n",
        escape_html(today),
        scenario_count
    );
    layout("Start", "", &body)
}

pub(crate) fn scenario_not_found_page(requested: &str) -> String {
    let body = format!(
        "<h1>Szenario nicht gefunden</h1>\n\
         <p class=\"muted\">Das Szenario \u{201e}{}\u{201c} existiert nicht.</p>\n",
        escape_html(requested)
    );
    layout("Nicht gefunden", "", &body)
}

fn flow_not_found_page() -> String {
    let body = "<h1>Sitzung nicht gefunden</h1>\n\
                <p class=\"muted\">Dieser Link ist abgelaufen. Bitte starte das Experiment neu.</p>\n\
                <a class=\"button\" href=\"/\">Zur Startseite</a>\n";
    layout("Nicht gefunden", "", body)
}

pub(crate) fn flow_page(view: &FlowView) -> String {
    match view.state {
        FlowState::Success => thank_you_page(
            "Danke!",
            "Deine Antwort wurde gespeichert. Du kannst dein Handy jetzt weglegen.",
        ),
        FlowState::Complete => thank_you_page(
            "Fertig!",
            &format!(
                "Du hast alle {} Szenarien bewertet. Du kannst dein Handy jetzt weglegen.",
                view.total
            ),
        ),
        FlowState::Ready | FlowState::Submitting | FlowState::Error => match &view.scenario {
            Some(scenario) => scenario_page(view, scenario),
            None => flow_not_found_page(),
        },
    }
}

fn thank_you_page(title: &str, message: &str) -> String {
    let body = format!(
        "<h1>Vielen Dank!</h1>\n<p class=\"muted\">{}</p>\n",
        escape_html(message)
    );
    layout(title, "", &body)
}

fn scenario_page(view: &FlowView, scenario: &ScenarioView) -> String {
    let submitting = view.state == FlowState::Submitting;
    let locked = submitting || view.state == FlowState::Error;
    let mut body = String::new();

    if view.mode == FlowMode::Multi {
        let percent = view.position * 100 / view.total.max(1);
        let _ = write!(
            body,
            "<p class=\"muted\"><small>Szenario {} von {}</small></p>\n\
             <div class=\"progress\"><div style=\"width:{}%\"></div></div>\n",
            view.position, view.total, percent
        );
    }

    let _ = write!(
        body,
        "<h1>{}</h1>\n<div class=\"card\"><small>Hintergrund</small>{}</div>\n",
        escape_html(&scenario.title),
        escape_html(&scenario.label)
    );

    if let Some(url) = &scenario.image_url {
        let _ = write!(
            body,
            "<figure><img src=\"{}\" alt=\"{}\" onerror=\"this.parentElement.style.display='none'\"></figure>\n",
            escape_html(url),
            escape_html(&scenario.title)
        );
    }

    let value = view.rating.unwrap_or(scenario.min_value);
    let shown = view.rating.map(|r| r.to_string()).unwrap_or_default();
    let _ = write!(
        body,
        "<form method=\"post\" action=\"/flows/{id}\">\n\
         <h2>{question}</h2>\n\
         <input type=\"range\" name=\"rating\" min=\"{min}\" max=\"{max}\" step=\"1\" value=\"{value}\"{disabled} \
         oninput=\"this.form.shown.value=this.value\">\n\
         <div class=\"scale\"><span>{min}</span><span>{max}</span></div>\n\
         <div class=\"value\"><output name=\"shown\">{shown}</output></div>\n\
         <p class=\"muted\"><small>Deine Bewertung</small></p>\n",
        id = escape_html(&view.id),
        question = escape_html(&scenario.question),
        min = scenario.min_value,
        max = scenario.max_value,
        value = value,
        disabled = if locked { " disabled" } else { "" },
        shown = shown,
    );

    if view.show_warning {
        body.push_str("<p class=\"warn\">Bitte wähle zuerst eine Bewertung.</p>\n");
    }
    if view.state == FlowState::Error || view.failure_notice {
        let _ = writeln!(body, "<p class=\"error\">{}</p>", SAVE_FAILED);
    }

    let label = if submitting {
        "Wird gesendet..."
    } else if view.mode == FlowMode::Single {
        "Abschicken"
    } else if view.is_last {
        "Abschließen"
    } else {
        "Weiter \u{2192}"
    };
    let _ = write!(
        body,
        "<button type=\"submit\"{}>{}</button>\n</form>\n\
         <p class=\"session\">Session: {}</p>\n",
        if submitting { " disabled" } else { "" },
        label,
        escape_html(view.session.as_str())
    );

    let title = match view.mode {
        FlowMode::Single => scenario.title.clone(),
        FlowMode::Multi => format!("{}/{} \u{2013} {}", view.position, view.total, scenario.title),
    };
    // A concurrent submit is in flight; poll until it resolves.
    let head_extra = if submitting {
        "<meta http-equiv=\"refresh\" content=\"1\">\n"
    } else {
        ""
    };
    layout(&title, head_extra, &body)
}

pub(crate) fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use pygmalion_core::{Catalog, Condition, FixedAssigner};
    use pygmalion_storage::MemorySink;

    use crate::serve::registry::FlowRegistry;
    use crate::serve::state::RateLimiter;

    fn app_state(sink: Arc<MemorySink>) -> Arc<AppState> {
        Arc::new(AppState {
            catalog: Catalog::builtin(),
            sink,
            assigner: Arc::new(FixedAssigner(Condition::Low)),
            flows: FlowRegistry::new(Duration::from_secs(60)),
            rate_limiter: RateLimiter::new(100),
        })
    }

    fn view(mode: FlowMode, state: FlowState) -> FlowView {
        FlowView {
            id: "abc".to_string(),
            mode,
            session: SessionId::resolve(Some("seminar")),
            state,
            position: 2,
            total: 5,
            scenario: Some(ScenarioView {
                id: "aufsatz".to_string(),
                title: "Bewertung eines Schulaufsatzes".to_string(),
                question: "Welche Note würdest du diesem Text geben?".to_string(),
                label: "Dieser Aufsatz stammt von einer Schülerin, die als besonders begabt gilt."
                    .to_string(),
                condition: Condition::High,
                min_value: 1,
                max_value: 6,
                image_url: Some("/images/aufsatz.jpg".to_string()),
            }),
            rating: Some(4),
            show_warning: false,
            failure_notice: false,
            is_last: false,
        }
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn start_page_prefills_session() {
        let html = start_page("2026-03-01", 5);
        assert!(html.contains("value=\"2026-03-01\""));
        assert!(html.contains("5 Szenarien nacheinander"));
        assert!(html.contains("action=\"/play\""));
    }

    #[test]
    fn multi_page_shows_progress_and_label() {
        let html = flow_page(&view(FlowMode::Multi, FlowState::Ready));
        assert!(html.contains("Szenario 2 von 5"));
        assert!(html.contains("Hintergrund"));
        assert!(html.contains("besonders begabt"));
        assert!(html.contains("value=\"4\""));
        assert!(html.contains("Weiter"));
        assert!(!html.contains(SAVE_FAILED));
    }

    #[test]
    fn last_multi_page_offers_finish() {
        let mut v = view(FlowMode::Multi, FlowState::Ready);
        v.is_last = true;
        assert!(flow_page(&v).contains("Abschließen"));
    }

    #[test]
    fn single_error_page_locks_slider_and_offers_retry() {
        let html = flow_page(&view(FlowMode::Single, FlowState::Error));
        assert!(html.contains(SAVE_FAILED));
        assert!(html.contains("value=\"4\" disabled"));
        assert!(html.contains("<button type=\"submit\">Abschicken</button>"));
        assert!(!html.contains("Szenario 2 von 5"));
    }

    #[test]
    fn warning_and_notice_render() {
        let mut v = view(FlowMode::Multi, FlowState::Ready);
        v.rating = None;
        v.show_warning = true;
        v.failure_notice = true;
        let html = flow_page(&v);
        assert!(html.contains("Bitte wähle zuerst eine Bewertung."));
        assert!(html.contains(SAVE_FAILED));
        assert!(html.contains("<output name=\"shown\"></output>"));
    }

    #[test]
    fn submitting_page_refreshes_and_disables_input() {
        let html = flow_page(&view(FlowMode::Multi, FlowState::Submitting));
        assert!(html.contains("http-equiv=\"refresh\""));
        assert!(html.contains("disabled>Wird gesendet..."));
    }

    #[test]
    fn terminal_pages_thank_the_participant() {
        let html = flow_page(&view(FlowMode::Single, FlowState::Success));
        assert!(html.contains("Vielen Dank!"));
        let html = flow_page(&view(FlowMode::Multi, FlowState::Complete));
        assert!(html.contains("Du hast alle 5 Szenarien bewertet."));
    }

    #[test]
    fn unknown_scenario_is_escaped() {
        let html = scenario_not_found_page("<script>");
        assert!(html.contains("Szenario nicht gefunden"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[tokio::test]
    async fn retry_form_without_rating_resends_the_record() {
        let sink = Arc::new(MemorySink::new());
        let state = app_state(sink.clone());
        let Started::Created(id) = state
            .flows
            .start_single(&state.catalog, "person", SessionId::default(), state.assigner.as_ref())
            .await
        else {
            panic!("person must exist");
        };
        let slot = state.flows.get(&id).await.unwrap();

        sink.fail_next(1);
        let response = handle_flow_form(
            State(state.clone()),
            Path(id.clone()),
            Form(RatingForm {
                rating: Some("8".to_string()),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(slot.lock().await.flow.view(&id).state, FlowState::Error);
        assert!(sink.is_empty());

        // The error page renders the slider disabled, so the retry posts no rating.
        let response = handle_flow_form(
            State(state.clone()),
            Path(id.clone()),
            Form(RatingForm::default()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(slot.lock().await.flow.view(&id).state, FlowState::Success);
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.records()[0].rating, 8);
        assert_eq!(sink.attempts(), 2);
    }
}
