//! Bridge to an external template compiler.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::entry::Entry;
use crate::error::PipesetError;
use crate::traits::Transform;

pub const PLUGIN_NAME: &str = "pipeset-template";

/// Name given to compiled client-side template functions unless
/// overridden.
pub const DEFAULT_FUNCTION_NAME: &str = "template";

/// An external template compiler. Both operations read the template from
/// disk themselves, and run on the blocking thread pool.
pub trait TemplateEngine: Send + Sync + 'static {
    /// Render the template at `path` into a finished document.
    fn render_file(&self, path: &Path) -> anyhow::Result<String>;

    /// Compile the template at `path` into a script defining a function
    /// called `function_name`.
    fn compile_client(&self, path: &Path, function_name: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Render,
    Script,
}

/// A [`Transform`] that compiles each template entry.
pub struct TemplateTransform<E> {
    engine:        Arc<E>,
    mode:          Mode,
    function_name: String,
}

impl<E: TemplateEngine> TemplateTransform<E> {
    /// Render to `.html`.
    pub fn render(engine: E) -> Self {
        Self::new(engine, Mode::Render)
    }

    /// Compile to a `.js` module whose default export is the template
    /// function.
    pub fn script(engine: E) -> Self {
        Self::new(engine, Mode::Script)
    }

    fn new(engine: E, mode: Mode) -> Self {
        Self {
            engine: Arc::new(engine),
            mode,
            function_name: DEFAULT_FUNCTION_NAME.to_string(),
        }
    }

    pub fn function_name(mut self, name: impl Into<String>) -> Self {
        self.function_name = name.into();
        self
    }

    async fn compile(&self, path: PathBuf) -> anyhow::Result<String> {
        let engine = Arc::clone(&self.engine);
        let mode = self.mode;
        let function_name = self.function_name.clone();

        tokio::task::spawn_blocking(move || match mode {
            Mode::Render => engine.render_file(&path),
            Mode::Script => {
                let script = engine.compile_client(&path, &function_name)?;
                Ok(format!("{script}\nexport default {function_name};"))
            }
        })
        .await?
    }
}

#[async_trait]
impl<E: TemplateEngine> Transform for TemplateTransform<E> {
    async fn transform(&mut self, mut entry: Entry) -> Result<Vec<Entry>, PipesetError> {
        let output = match self.compile(entry.path.clone()).await {
            Ok(output) => output,
            Err(source) => {
                return Err(PipesetError::Engine {
                    plugin: PLUGIN_NAME,
                    path: entry.path,
                    source,
                })
            }
        };

        let extension = match self.mode {
            Mode::Render => "html",
            Mode::Script => "js",
        };
        entry.path.set_extension(extension);
        entry.contents = Some(output.into_bytes());
        Ok(vec![entry])
    }
}
