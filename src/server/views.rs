//! Server-rendered HTML page.

use serde::Serialize;
use tera::{Context, Tera};

use crate::document::DocumentKind;
use crate::error::Result;
use crate::history::ChatHistory;

pub const PAGE_TITLE: &str = "📄 RAG-Driven Document Q&A System";
pub const UPLOAD_SUCCESS: &str = "File uploaded successfully!";

const INDEX_TEMPLATE_NAME: &str = "index.html";
const INDEX_TEMPLATE: &str = include_str!("templates/index.html");

/// Load the page templates. Names ending in `.html` are autoescaped.
pub fn load_templates() -> Result<Tera> {
    let mut tera = Tera::default();
    tera.add_raw_template(INDEX_TEMPLATE_NAME, INDEX_TEMPLATE)?;
    Ok(tera)
}

/// Everything the page shows besides the history.
#[derive(Debug, Default, Clone, Serialize)]
pub struct PageView {
    pub notice: Option<String>,
    pub error: Option<String>,
    pub question: String,
    pub answer: Option<String>,
}

impl PageView {
    pub fn notice(message: impl Into<String>) -> Self {
        Self {
            notice: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn answered(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: Some(answer.into()),
            ..Default::default()
        }
    }
}

pub fn render_page(tera: &Tera, view: &PageView, history: &ChatHistory) -> Result<String> {
    let accept = DocumentKind::ACCEPTED_EXTENSIONS
        .iter()
        .map(|ext| format!(".{}", ext))
        .collect::<Vec<_>>()
        .join(",");

    let mut context = Context::new();
    context.insert("title", PAGE_TITLE);
    context.insert("accept", &accept);
    context.insert("notice", &view.notice);
    context.insert("error", &view.error);
    context.insert("question", &view.question);
    context.insert("answer", &view.answer);
    context.insert("history", history);
    Ok(tera.render(INDEX_TEMPLATE_NAME, &context)?)
}
