// Scripted executor shared by the engine's unit tests.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::executor::{CommandExecutor, CommandResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl Invocation {
    /// The git subcommand, e.g. `clone`, `remote`, `gc`.
    pub fn subcommand(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or_default()
    }

    /// Last path component of the working directory (the mirror name for update/gc).
    pub fn cwd_name(&self) -> &str {
        self.cwd.file_name().and_then(|name| name.to_str()).unwrap_or_default()
    }

    /// Target directory name of a `clone` invocation.
    pub fn clone_target(&self) -> Option<&str> {
        (self.subcommand() == "clone").then(|| self.args.last().map(String::as_str)).flatten()
    }
}

type Responder = dyn Fn(&Invocation) -> Result<CommandResult, io::Error> + Send + Sync;

/// Records every invocation and answers with a caller-supplied responder.
#[derive(Clone)]
pub(crate) struct ScriptedExecutor {
    calls: Arc<Mutex<Vec<Invocation>>>,
    responder: Arc<Responder>,
}

impl ScriptedExecutor {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&Invocation) -> Result<CommandResult, io::Error> + Send + Sync + 'static,
    {
        Self { calls: Arc::new(Mutex::new(Vec::new())), responder: Arc::new(responder) }
    }

    /// Every command succeeds; `clone` creates its target directory like git would.
    pub fn succeeding() -> Self {
        Self::new(|invocation| {
            create_clone_target(invocation)?;
            Ok(ok(""))
        })
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().expect("mock calls lock poisoned").clone()
    }

    pub fn calls_for(&self, subcommand: &str) -> Vec<Invocation> {
        self.calls().into_iter().filter(|call| call.subcommand() == subcommand).collect()
    }
}

impl CommandExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandResult, io::Error> {
        let invocation = Invocation {
            program: program.to_string(),
            args: args.to_vec(),
            cwd: cwd.to_path_buf(),
        };
        self.calls.lock().expect("mock calls lock poisoned").push(invocation.clone());
        (self.responder)(&invocation)
    }
}

pub(crate) fn create_clone_target(invocation: &Invocation) -> io::Result<()> {
    if let Some(target) = invocation.clone_target() {
        std::fs::create_dir(invocation.cwd.join(target))?;
    }
    Ok(())
}

pub(crate) fn ok(stdout: &str) -> CommandResult {
    CommandResult {
        success: true,
        code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

pub(crate) fn failed(code: i32, stderr: &str) -> CommandResult {
    CommandResult {
        success: false,
        code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}
