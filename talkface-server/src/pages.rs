//! HTML pages rendered with Tera.
//!
//! Embedded templates are baked into the binary; a `.tera` file with the
//! same name under `server.template_dir` replaces the embedded one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tera::{Context, Tera};

use crate::error::{io_err, ServerError};

const TPLS: &[(&str, &str)] = &[
    ("base.html.tera", include_str!("templates/base.html.tera")),
    ("index.html.tera", include_str!("templates/index.html.tera")),
    ("result.html.tera", include_str!("templates/result.html.tera")),
    ("error.html.tera", include_str!("templates/error.html.tera")),
];

/// Bundle line on the form page.
#[derive(Debug, Clone, Serialize)]
pub struct BundleLine {
    pub name: String,
    pub present: bool,
}

/// Everything the result page shows.
#[derive(Debug, Clone, Serialize)]
pub struct ResultView<'a> {
    pub job_id: &'a str,
    pub text: &'a str,
    /// Percent-encoded; the template emits it unescaped.
    pub video_url: &'a str,
    pub file_name: &'a str,
    pub duration_secs: String,
}

pub struct Pages {
    tera: Tera,
}

impl Pages {
    pub fn new(user_template_dir: Option<&Path>) -> Result<Self, ServerError> {
        Ok(Self {
            tera: build_tera(user_template_dir)?,
        })
    }

    pub fn index(&self, bundles: &[BundleLine]) -> Result<String, ServerError> {
        let mut ctx = Context::new();
        ctx.insert("bundles", bundles);
        Ok(self.tera.render("index.html.tera", &ctx)?)
    }

    pub fn result(&self, view: &ResultView<'_>) -> Result<String, ServerError> {
        let ctx = Context::from_serialize(view)?;
        Ok(self.tera.render("result.html.tera", &ctx)?)
    }

    /// `stage`/`kind` are empty for failures outside the render pipeline.
    pub fn error(
        &self,
        status: u16,
        stage: &str,
        kind: &str,
        message: &str,
    ) -> Result<String, ServerError> {
        let mut ctx = Context::new();
        ctx.insert("status", &status);
        ctx.insert("stage", stage);
        ctx.insert("kind", kind);
        ctx.insert("message", message);
        Ok(self.tera.render("error.html.tera", &ctx)?)
    }
}

fn build_tera(user_template_dir: Option<&Path>) -> Result<Tera, ServerError> {
    let mut templates: HashMap<String, String> = TPLS
        .iter()
        .map(|(name, content)| ((*name).to_string(), (*content).to_string()))
        .collect();
    if let Some(dir) = user_template_dir {
        for (name, content) in load_user_templates(dir)? {
            tracing::debug!(template = %name, "using template override");
            templates.insert(name, content);
        }
    }

    let mut tera = Tera::default();
    // Names end in `.tera`, which the default autoescape suffixes miss.
    tera.autoescape_on(vec![".html.tera"]);
    tera.add_raw_templates(templates.into_iter().collect::<Vec<_>>())?;
    Ok(tera)
}

fn load_user_templates(dir: &Path) -> Result<Vec<(String, String)>, ServerError> {
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut templates = Vec::new();
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path: PathBuf = entry.path();
        if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("tera") {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_lowercase();
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        templates.push((name, contents));
    }
    Ok(templates)
}
