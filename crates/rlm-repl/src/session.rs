//! Embedded Python session: persistent scope, builtin seeding, output capture.

use std::sync::Arc;

use rustpython_vm as vm;
use tokio::runtime::Handle;
use vm::builtins::PyBaseException;
use vm::scope::Scope;
use vm::{Interpreter, InterpreterBuilder, PyObjectRef, PyResult, VirtualMachine};

use rlm_core::error::{Result, RlmError};

use crate::convert;
use crate::{RecursiveRunner, SessionSpec};

/// Result of one `execute()` against the session.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    /// Captured stdout + stderr, with any uncaught exception's traceback
    /// appended.
    pub output: String,
    pub has_error: bool,
    /// Set once the snippet (or an earlier one) has called `FINAL`.
    pub terminal: Option<serde_json::Value>,
}

/// Seeds the terminal slot and its two writers. `FINAL` stores its argument
/// and lets the snippet run to completion; the loop inspects the slot after
/// every execution.
const SETUP_CODE: &str = r#"
__rlm_final__ = None
__rlm_final_set__ = False

def FINAL(value):
    global __rlm_final__, __rlm_final_set__
    __rlm_final__ = value
    __rlm_final_set__ = True

def FINAL_VAR(value):
    FINAL(value)
"#;

const CAPTURE_PREAMBLE: &str = r#"
import sys as __rlm_sys
import io as __rlm_io
__rlm_prev_stdout = __rlm_sys.stdout
__rlm_prev_stderr = __rlm_sys.stderr
__rlm_buffer = __rlm_io.StringIO()
__rlm_sys.stdout = __rlm_buffer
__rlm_sys.stderr = __rlm_buffer
"#;

const CAPTURE_POSTAMBLE: &str = r#"
__rlm_sys.stdout = __rlm_prev_stdout
__rlm_sys.stderr = __rlm_prev_stderr
__rlm_output__ = __rlm_buffer.getvalue()
del __rlm_buffer
"#;

pub(crate) struct ReplEnv {
    interpreter: Interpreter,
    scope: Scope,
}

impl ReplEnv {
    pub fn new(spec: SessionSpec, runtime: Handle) -> Result<Self> {
        let interpreter = init_stdlib(InterpreterBuilder::new()).interpreter();
        let scope = interpreter
            .enter(|vm: &VirtualMachine| -> PyResult<Scope> { Ok(vm.new_scope_with_builtins()) })
            .map_err(|err: vm::PyRef<PyBaseException>| {
                RlmError::Repl(format!("interpreter init failed: {err:?}"))
            })?;

        let env = Self { interpreter, scope };
        env.install(spec, runtime)?;
        Ok(env)
    }

    /// Seed the session: the `context` variable, `FINAL`/`FINAL_VAR`, and the
    /// native `llm_query` function. `llm_query` is installed even past the
    /// depth limit so that calling it reports `MaxDepthExceeded` at the
    /// offending code site instead of failing with a NameError.
    fn install(&self, spec: SessionSpec, runtime: Handle) -> Result<()> {
        let SessionSpec {
            context,
            depth,
            max_depth,
            run_id,
            runner,
            setup_code,
        } = spec;

        let scope = self.scope.clone();
        self.interpreter
            .enter(move |vm: &VirtualMachine| -> PyResult<()> {
                let context_obj = convert::json_to_py(vm, &context)?;
                scope.globals.set_item("context", context_obj, vm)?;

                let llm_query = make_llm_query(runner, runtime, depth, max_depth, run_id, vm);
                scope.globals.set_item("llm_query", llm_query, vm)?;

                vm.run_string(scope.clone(), SETUP_CODE, "<rlm-setup>".to_owned())?;
                if let Some(code) = setup_code {
                    vm.run_string(scope.clone(), &code, "<rlm-host-setup>".to_owned())?;
                }
                Ok(())
            })
            .map_err(|err: vm::PyRef<PyBaseException>| {
                RlmError::Repl(format!("session setup failed: {err:?}"))
            })
    }

    /// Run one snippet against the persistent scope, capturing stdout/stderr
    /// and formatting any uncaught exception's traceback into the output.
    pub fn execute(&mut self, code: &str) -> Result<ExecOutcome> {
        let scope = self.scope.clone();
        self.interpreter
            .enter(|vm: &VirtualMachine| -> PyResult<ExecOutcome> {
                vm.run_string(scope.clone(), CAPTURE_PREAMBLE, "<rlm-capture>".to_owned())?;

                let mut traceback = String::new();
                let has_error =
                    match vm.run_string(scope.clone(), code, "<repl>".to_owned()) {
                        Ok(_) => false,
                        Err(exc) => {
                            let _ = vm.write_exception(&mut traceback, &exc);
                            true
                        }
                    };

                vm.run_string(scope.clone(), CAPTURE_POSTAMBLE, "<rlm-capture>".to_owned())?;

                let mut output = scope
                    .globals
                    .get_item("__rlm_output__", vm)
                    .ok()
                    .and_then(|value| value.try_to_value::<String>(vm).ok())
                    .unwrap_or_default();
                if !traceback.is_empty() {
                    if !output.is_empty() && !output.ends_with('\n') {
                        output.push('\n');
                    }
                    output.push_str(&traceback);
                }

                let terminal = if self.final_set(vm)? {
                    let value = scope.globals.get_item("__rlm_final__", vm)?;
                    Some(convert::py_to_json(vm, &value)?)
                } else {
                    None
                };

                Ok(ExecOutcome {
                    output,
                    has_error,
                    terminal,
                })
            })
            .map_err(|err: vm::PyRef<PyBaseException>| {
                RlmError::Repl(format!("session internals failed: {err:?}"))
            })
    }

    fn final_set(&self, vm: &VirtualMachine) -> PyResult<bool> {
        Ok(self
            .scope
            .globals
            .get_item("__rlm_final_set__", vm)
            .ok()
            .and_then(|value| value.try_to_value::<bool>(vm).ok())
            .unwrap_or(false))
    }
}

/// Build the native `llm_query(query) -> value` function. It blocks the REPL
/// worker thread on the child agent future via the runtime handle; the child
/// itself runs on the async runtime. A child error surfaces as an ordinary
/// RuntimeError at the call site.
fn make_llm_query(
    runner: Arc<dyn RecursiveRunner>,
    runtime: Handle,
    depth: u32,
    max_depth: u32,
    run_id: String,
    vm: &VirtualMachine,
) -> PyObjectRef {
    vm.new_function(
        "llm_query",
        move |query: String, vm: &VirtualMachine| -> PyResult<PyObjectRef> {
            if depth >= max_depth {
                let err = RlmError::MaxDepthExceeded {
                    depth: depth + 1,
                    max_depth,
                };
                return Err(vm.new_runtime_error(err.to_string()));
            }

            let outcome =
                runtime.block_on(runner.run_child(query, depth + 1, run_id.clone()));
            match outcome {
                Ok(value) => convert::json_to_py(vm, &value),
                Err(err) => Err(vm.new_runtime_error(err.to_string())),
            }
        },
    )
    .into()
}

fn init_stdlib(builder: InterpreterBuilder) -> InterpreterBuilder {
    let defs = rustpython_stdlib::stdlib_module_defs(&builder.ctx);
    builder
        .add_native_modules(&defs)
        .add_frozen_modules(rustpython_pylib::FROZEN_STDLIB)
        .init_hook(set_frozen_stdlib_dir)
}

fn set_frozen_stdlib_dir(vm: &mut VirtualMachine) {
    use rustpython_vm::common::rc::PyRc;

    if let Some(state) = PyRc::get_mut(&mut vm.state) {
        state.config.paths.stdlib_dir = Some(rustpython_pylib::LIB_PATH.to_owned());
    }
}
