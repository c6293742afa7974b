//! Template rendering over minijinja.
//!
//! The renderer is a thin seam: templates load from a directory, context
//! processors contribute request-derived entries (the flash processor is
//! the canonical one), and the rendered text comes back as an HTML
//! [`Response`]. Everything interesting happens inside minijinja.

use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::assets::AssetRegistry;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

/// Contributes request-derived entries to every render's context.
pub type ContextProcessor = Arc<dyn Fn(&Request) -> Map<String, Value> + Send + Sync>;

pub struct TemplateRenderer {
    env: minijinja::Environment<'static>,
    context_processors: Vec<ContextProcessor>,
}

impl TemplateRenderer {
    /// Loads templates from `template_dir`. Missing templates surface when
    /// first rendered, not here.
    pub fn new(template_dir: impl AsRef<Path>) -> Self {
        let mut env = minijinja::Environment::new();
        env.set_loader(minijinja::path_loader(template_dir.as_ref()));
        Self {
            env,
            context_processors: Vec::new(),
        }
    }

    pub fn add_context_processor(&mut self, processor: ContextProcessor) {
        self.context_processors.push(processor);
    }

    /// Exposes `asset_urls(bundle)` to templates.
    pub fn register_assets(&mut self, assets: &AssetRegistry) {
        let assets = assets.clone();
        self.env
            .add_function("asset_urls", move |bundle: String| assets.urls(&bundle));
    }

    /// Request-aware render: applies the registered context processors,
    /// then renders.
    pub fn render(
        &self,
        req: &Request,
        template_name: &str,
        mut context: Map<String, Value>,
    ) -> Result<Response, Error> {
        for processor in &self.context_processors {
            context.extend(processor(req));
        }
        self.render_template(template_name, &context)
    }

    /// Renders `template_name` with `context` as an HTML response.
    pub fn render_template(
        &self,
        template_name: &str,
        context: &Map<String, Value>,
    ) -> Result<Response, Error> {
        let template = self.env.get_template(template_name)?;
        let body = template.render(minijinja::Value::from_serialize(context))?;
        Ok(Response::html(body))
    }
}
