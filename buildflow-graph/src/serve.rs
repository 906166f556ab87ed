//! Foreground process supervision for serve-style tasks.
//!
//! Dev servers and watchers run until interrupted. On Ctrl-C the child is
//! asked to terminate, then fed a confirmation on stdin for tools that
//! prompt "exit? y/N" during shutdown.

use anyhow::{bail, Context};
use camino::Utf8Path;
use std::io::Write;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;
use std::time::Duration;
use tracing::{debug, info};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static HOOK: Once = Once::new();

/// Install the process-wide Ctrl-C hook. Idempotent; the handler can only
/// be registered once per process.
fn install_hook() {
    HOOK.call_once(|| {
        if let Err(err) = ctrlc::set_handler(|| {
            INTERRUPTED.store(true, Ordering::SeqCst);
        }) {
            debug!(%err, "ctrl-c handler not installed");
        }
    });
}

pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Run a long-lived command in the foreground until it exits or the user
/// interrupts. `confirm` is written to the child's stdin after the
/// termination signal, for tools that prompt before shutting down.
pub fn run_foreground(
    root: &Utf8Path,
    argv: &[String],
    cwd: Option<&Utf8Path>,
    confirm: Option<&[u8]>,
) -> anyhow::Result<()> {
    let Some((program, args)) = argv.split_first() else {
        bail!("empty command line");
    };
    install_hook();
    INTERRUPTED.store(false, Ordering::SeqCst);

    let dir = match cwd {
        Some(rel) => root.join(rel),
        None => root.to_owned(),
    };
    let mut command = Command::new(program);
    command.args(args).current_dir(dir.as_std_path());
    if confirm.is_some() {
        command.stdin(Stdio::piped());
    }
    let mut child = command
        .spawn()
        .with_context(|| format!("spawn `{program}`"))?;

    loop {
        if let Some(status) = child.try_wait().context("poll child")? {
            if interrupted() || status.success() {
                return Ok(());
            }
            bail!("`{}` exited with {status}", argv.join(" "));
        }
        if interrupted() {
            info!(command = %argv.join(" "), "interrupt received, shutting down");
            shutdown(&mut child, confirm)?;
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}

/// Signal the child to terminate, answer its shutdown prompt, then wait.
fn shutdown(child: &mut Child, confirm: Option<&[u8]>) -> anyhow::Result<()> {
    terminate(child)?;
    if let (Some(bytes), Some(stdin)) = (confirm, child.stdin.as_mut()) {
        // The child may close stdin between the signal and the write.
        let _ = stdin.write_all(bytes);
        let _ = stdin.flush();
    }
    child.wait().context("wait for child")?;
    Ok(())
}

/// Politely terminate a child process. SIGTERM on unix so the child can
/// run its own shutdown path; hard kill elsewhere.
pub fn terminate(child: &mut Child) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM).context("signal child")?;
    }
    #[cfg(not(unix))]
    {
        child.kill().context("kill child")?;
    }
    Ok(())
}
