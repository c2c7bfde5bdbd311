use std::path::PathBuf;

/// Default bound on nested script calls before the fatal stack overflow.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 100_000;

/// Settings for one [`Interpreter`](crate::Interpreter).
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// Directories searched for `import` paths after the importing file's own
    /// directory.
    pub module_paths: Vec<PathBuf>,
    /// Directory that relative imports in `eval_source` input resolve against.
    pub base_dir: Option<PathBuf>,
    pub max_call_depth: usize,
    /// Name reported in diagnostics for top-level source.
    pub module_name: Option<String>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            module_paths: Vec::new(),
            base_dir: None,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            module_name: None,
        }
    }
}

impl InterpreterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.module_paths.push(path.into());
        self
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_module_name(mut self, name: impl Into<String>) -> Self {
        self.module_name = Some(name.into());
        self
    }
}
