#![allow(dead_code)]

use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use modeler_fixture::stager::plan::{FixtureTree, FixtureVariant};

pub const JOB: &str = "780200XXC00";

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_modeler-fixture") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) {
        "modeler-fixture.exe"
    } else {
        "modeler-fixture"
    };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve modeler-fixture binary path for integration test"),
    }
}

/// Fixture command with zero delays, quirks off, and logs under `work`.
pub fn fixture_command(work: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(resolve_bin_path());
    cmd.args(args)
        .env("MDLR_SETUP_DELAY_MS", "0")
        .env("MDLR_STEP_DELAY_MS", "0")
        .env("MDLR_RESULT_DELAY_MIN_MS", "0")
        .env("MDLR_RESULT_DELAY_MAX_MS", "0")
        .env("MDLR_SKIP_SEND_ONE_IN", "0")
        .env("MDLR_COMBINED_MESSAGE_ONE_IN", "0")
        .env("MDLR_OMIT_RESULT_ONE_IN", "0")
        .env("MDLR_FAIL_RESULT_ONE_IN", "0")
        .env("MDLR_ACTIVITY_LOG", work.join("activity.jsonl"))
        .env("HOME", work)
        .env("RUST_BACKTRACE", "1");
    cmd
}

fn write_case_log(case_name: &str, args: &[&str], output: &Output) -> PathBuf {
    let root = std::env::temp_dir().join("modeler-fixture-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");
    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&String::from_utf8_lossy(&output.stdout));
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&String::from_utf8_lossy(&output.stderr));
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");
    log_path
}

pub fn run_cli_case(case_name: &str, work: &Path, args: &[&str]) -> CmdResult {
    let output = fixture_command(work, args)
        .output()
        .expect("execute modeler-fixture");
    finish_case(case_name, args, output)
}

pub fn spawn_cli_case(work: &Path, args: &[&str]) -> Child {
    fixture_command(work, args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn modeler-fixture")
}

pub fn finish_case(case_name: &str, args: &[&str], output: Output) -> CmdResult {
    let log_path = write_case_log(case_name, args, &output);
    CmdResult {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        log_path,
    }
}

/// Populate the four fixture subtrees for `JOB`. Each Data.xml names its variant.
pub fn build_fixture_tree(root: &Path) -> FixtureTree {
    let tree = FixtureTree::new(root, JOB);
    for variant in FixtureVariant::ALL {
        let sub = tree.subtree(variant);
        fs::create_dir_all(&sub).expect("create fixture subtree");
        fs::write(
            sub.join("Data.xml"),
            format!("<Result><Overall>{variant}</Overall></Result>\n"),
        )
        .expect("write Data.xml");
    }
    let pass = tree.subtree(FixtureVariant::Pass);
    for name in [
        format!("{JOB}_step1.mat"),
        format!("{JOB}_step2.mat"),
        format!("{JOB}_step3.mat"),
        format!("EEPROM_variables_{JOB}.mat"),
        "CAP.tab".to_string(),
        "TUNE.tab".to_string(),
    ] {
        fs::write(pass.join(&name), format!("payload for {name}")).expect("write step file");
    }
    tree
}

/// A port that was free a moment ago.
pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|a| a.port())
        .expect("reserve ephemeral port")
}

/// Connect, retrying while the fixture is still in setup.
pub fn connect_with_retry(addr: SocketAddr, within: Duration) -> TcpStream {
    let deadline = Instant::now() + within;
    loop {
        match TcpStream::connect(addr) {
            Ok(stream) => return stream,
            Err(_) if Instant::now() < deadline => thread::sleep(Duration::from_millis(20)),
            Err(e) => panic!("fixture never started listening on {addr}: {e}"),
        }
    }
}

/// Send `status` and return the reply, or `None` if nothing arrives within `wait`.
pub fn poll(stream: &mut TcpStream, wait: Duration) -> Option<String> {
    stream.write_all(b"status").expect("send status");
    stream.set_read_timeout(Some(wait)).expect("set read timeout");
    let mut buf = [0u8; 256];
    match stream.read(&mut buf) {
        Ok(0) => None,
        Ok(n) => Some(String::from_utf8_lossy(&buf[..n]).into_owned()),
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => None,
        Err(e) => panic!("read failed: {e}"),
    }
}
