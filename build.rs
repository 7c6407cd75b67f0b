use std::{
    fs,
    path::Path,
    process::Command,
    time::{SystemTime, UNIX_EPOCH},
};

const UNKNOWN: &str = "unknown";

fn main() {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    println!("cargo:rustc-env=BUILD_TIME={}", now);

    println!("cargo:rerun-if-changed=.git/HEAD");
    if Path::new(".git/refs/heads").exists() {
        println!("cargo:rerun-if-changed=.git/refs/heads");
    }

    let git = GitInfo::collect();
    println!("cargo:rustc-env=GIT_BRANCH={}", git.branch);
    println!("cargo:rustc-env=GIT_COMMIT={}", git.commit);
    println!("cargo:rustc-env=GIT_COMMIT_TIME={}", git.commit_time_ms);
}

struct GitInfo {
    branch: String,
    commit: String,
    commit_time_ms: u64,
}

impl GitInfo {
    /// Asks the git binary first, then reads `.git/` directly. Builds from a
    /// source tarball end up with "unknown" and a zero timestamp.
    fn collect() -> Self {
        let (head_branch, head_commit) = read_head();

        let branch = git(&["rev-parse", "--abbrev-ref", "HEAD"])
            .or(head_branch)
            .unwrap_or_else(|| UNKNOWN.to_string());
        let commit = git(&["rev-parse", "HEAD"])
            .or(head_commit)
            .unwrap_or_else(|| UNKNOWN.to_string());
        let commit_time_ms = git(&["show", "-s", "--format=%ct", "HEAD"])
            .and_then(|s| s.parse::<u64>().ok())
            .map(|secs| secs * 1000)
            .or_else(|| ref_mtime_ms(&branch))
            .unwrap_or(0);

        Self {
            branch,
            commit,
            commit_time_ms,
        }
    }
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let value = String::from_utf8(output.stdout).ok()?.trim().to_string();
    (!value.is_empty()).then_some(value)
}

/// Branch and commit from `.git/HEAD`, following one level of `ref:`.
fn read_head() -> (Option<String>, Option<String>) {
    let Ok(head) = fs::read_to_string(".git/HEAD") else {
        return (None, None);
    };
    match head.trim().strip_prefix("ref: ") {
        Some(ref_path) => {
            let branch = ref_path.rsplit('/').next().map(str::to_string);
            let commit = fs::read_to_string(format!(".git/{}", ref_path))
                .ok()
                .map(|c| c.trim().to_string());
            (branch, commit)
        }
        None => (None, Some(head.trim().to_string())),
    }
}

fn ref_mtime_ms(branch: &str) -> Option<u64> {
    let modified = fs::metadata(format!(".git/refs/heads/{}", branch))
        .ok()?
        .modified()
        .ok()?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
    Some(since_epoch.as_millis() as u64)
}
