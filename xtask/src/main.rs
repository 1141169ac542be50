use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::{exit, Command};

#[derive(Parser)]
#[command(author, version, about = "Developer tasks for the Murmur listener")]
struct Cli {
    #[command(subcommand)]
    command: Task,
}

#[derive(Subcommand)]
enum Task {
    #[command(about = "Run `cargo fmt --all`")]
    Fmt,
    #[command(about = "Run format + clippy lint checks")]
    Lint,
    #[command(about = "Execute `cargo test --workspace`")]
    Test,
    #[command(about = "Run fmt + clippy + test sequence")]
    Ci,
    #[command(about = "Build the client binary and check that its CLI starts")]
    CiCliSmoke,
}

fn main() {
    let cli = Cli::parse();

    let Some(workspace_root) = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
    else {
        eprintln!("xtask must live inside the workspace");
        exit(1);
    };

    let result = match cli.command {
        Task::Fmt => run_commands(&workspace_root, [("cargo", &["fmt", "--all"])]),
        Task::Lint => run_commands(
            &workspace_root,
            [
                ("cargo", &["fmt", "--all", "--", "--check"]),
                ("cargo", &["clippy", "--workspace", "--", "-D", "warnings"]),
            ],
        ),
        Task::Test => run_commands(&workspace_root, [("cargo", &["test", "--workspace"])]),
        Task::Ci => run_ci(&workspace_root),
        Task::CiCliSmoke => run_cli_smoke(&workspace_root),
    };

    if !result {
        exit(1);
    }
}

fn run_ci(workspace_root: &Path) -> bool {
    if !run_commands(
        workspace_root,
        [
            ("cargo", &["fmt", "--all", "--", "--check"]),
            ("cargo", &["clippy", "--workspace", "--", "-D", "warnings"]),
        ],
    ) {
        return false;
    }
    run_commands(workspace_root, [("cargo", &["test", "--workspace"])])
}

fn run_cli_smoke(workspace_root: &Path) -> bool {
    if !run_commands(
        workspace_root,
        [("cargo", &["build", "-p", "murmur-client"])],
    ) {
        return false;
    }

    let output = match Command::new("cargo")
        .args(["run", "--quiet", "-p", "murmur-client", "--", "--help"])
        .current_dir(workspace_root)
        .output()
    {
        Ok(output) => output,
        Err(err) => {
            eprintln!("failed to launch murmur-client: {err}");
            return false;
        }
    };

    if !output.status.success() {
        eprintln!("murmur-client --help exited with {}", output.status);
        return false;
    }

    let help = String::from_utf8_lossy(&output.stdout);
    let missing: Vec<_> = ["--gateway-url", "--room", "--stun-server", "--send-audio"]
        .into_iter()
        .filter(|flag| !help.contains(flag))
        .collect();
    if !missing.is_empty() {
        eprintln!("client help output is missing flags: {}", missing.join(", "));
        return false;
    }
    true
}

fn run_commands<const N: usize>(workspace_root: &Path, commands: [(&str, &[&str]); N]) -> bool {
    for (program, args) in commands {
        let status = Command::new(program)
            .args(args)
            .current_dir(workspace_root)
            .status();

        match status {
            Ok(status) if status.success() => {}
            Ok(status) => {
                eprintln!("command '{program} {}' failed with {status}", args.join(" "));
                return false;
            }
            Err(err) => {
                eprintln!("failed to spawn '{program}': {err}");
                return false;
            }
        }
    }
    true
}
