//! `import` directives. A module is a source file evaluated once in its own
//! scope and exposed as a static class named after the file stem.

use std::{
    fs,
    path::{Path, PathBuf},
    rc::Rc,
};

use tracing::debug;

use super::Interpreter;
use crate::{
    ast::ImportForm,
    class::{static_class_from_scope, ClassRef},
    diagnostics::{fail, ErrorKind, Result},
    parser,
    scope::{Binding, Scope},
};

const SOURCE_EXTENSION: &str = "cv";

impl Interpreter {
    pub(crate) fn import(&mut self, path: &str, form: &ImportForm) -> Result<()> {
        let resolved = self.resolve_module(path)?;
        let module = self.load_module(&resolved)?;
        match form {
            ImportForm::Whole { alias } => {
                let name = alias.clone().unwrap_or_else(|| module.name.clone());
                self.scope.borrow_mut().define_class(&name, module);
            }
            ImportForm::Names(names) => {
                for name in names {
                    let Some(binding) = module.scope.borrow().local(name) else {
                        return fail(
                            ErrorKind::UndefinedName,
                            format!("module `{}` does not export `{name}`", module.name),
                        );
                    };
                    let mut scope = self.scope.borrow_mut();
                    match binding {
                        Binding::Class(class) => scope.define_class(name, class),
                        Binding::Functions(set) => scope.define_function_set(set),
                        Binding::Variable(variable) => scope.set_variable(name, variable),
                    }
                }
            }
        }
        Ok(())
    }

    /// Finds the file an import path names: relative to the importing file,
    /// then to each configured module path.
    fn resolve_module(&self, path: &str) -> Result<PathBuf> {
        let mut relative = PathBuf::from(path);
        if relative.extension().is_none() {
            relative.set_extension(SOURCE_EXTENSION);
        }
        if relative.is_absolute() {
            return Ok(relative.canonicalize()?);
        }

        let importing_dir = self
            .dir_stack
            .last()
            .cloned()
            .or_else(|| self.config.base_dir.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        let candidates = std::iter::once(importing_dir).chain(self.config.module_paths.iter().cloned());
        for dir in candidates {
            let candidate = dir.join(&relative);
            if candidate.is_file() {
                return Ok(candidate.canonicalize()?);
            }
        }
        fail(
            ErrorKind::UndefinedName,
            format!("module `{path}` was not found"),
        )
    }

    fn load_module(&mut self, path: &Path) -> Result<ClassRef> {
        if let Some(module) = self.modules.get(path) {
            debug!(path = %path.display(), "module cache hit");
            return Ok(Rc::clone(module));
        }
        if !self.loading.insert(path.to_path_buf()) {
            return fail(
                ErrorKind::InvalidOperation,
                format!("circular import of `{}`", path.display()),
            );
        }

        let result = self.evaluate_module_file(path);
        self.loading.remove(path);
        let module = result?;
        self.modules.insert(path.to_path_buf(), Rc::clone(&module));
        Ok(module)
    }

    fn evaluate_module_file(&mut self, path: &Path) -> Result<ClassRef> {
        let source = fs::read_to_string(path)?;
        let module = parser::parse_module(&source)?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        let scope = Scope::module(Some(Rc::clone(&self.globals)));
        self.dir_stack
            .push(path.parent().map(Path::to_path_buf).unwrap_or_default());
        let result = self.in_scope(Rc::clone(&scope), |this| this.eval_module(&module));
        self.dir_stack.pop();
        result?;

        let class = static_class_from_scope(&name, &scope, Some(Rc::clone(&self.globals)));
        debug!(module = %name, path = %path.display(), "imported module");
        Ok(class)
    }
}
