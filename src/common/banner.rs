const GREEN: &str = "\x1b[32m";
const CYAN: &str = "\x1b[36m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";

macro_rules! env_or {
    ($key:literal, $default:literal) => {
        option_env!($key).unwrap_or($default)
    };
}

pub struct BannerInfo {
    pub version: &'static str,
    pub branch: &'static str,
    pub commit: &'static str,
    pub profile: &'static str,
}

impl Default for BannerInfo {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            branch: env_or!("GIT_BRANCH", "unknown"),
            commit: env_or!("GIT_COMMIT", "unknown"),
            profile: if cfg!(debug_assertions) {
                "debug"
            } else {
                "release"
            },
        }
    }
}

impl BannerInfo {
    pub fn commit_short(&self) -> &'static str {
        self.commit.get(..7).unwrap_or(self.commit)
    }
}

pub fn print_banner(info: &BannerInfo, address: &str) {
    println!();
    println!("{GREEN}                   ___       __               __  {RESET}");
    println!("{GREEN}  ____ ___ _____  / (_)___  / /_  ____  _____/ /_ {RESET}");
    println!("{GREEN} / __ `/ / / / __ \\/ / / __ \\/ __ \\/ __ \\/ ___/ __/ {RESET}");
    println!("{GREEN}/ /_/ / /_/ / /_/ / / / /_/ / / / / /_/ (__  ) /_   {RESET}");
    println!("{GREEN}\\__,_/\\__,_/\\__,_/_/_/\\____/_/ /_/\\____/____/\\__/   {RESET}");
    println!("{DIM}========================================{RESET}");
    println!();

    print_row("Version", info.version, CYAN);
    print_row("Branch", info.branch, RESET);
    print_row("Commit", info.commit_short(), RESET);
    print_row("Profile", info.profile, YELLOW);
    println!("  {BOLD}{:<14}{RESET}{address}", "Listening");
    println!();
}

fn print_row(label: &str, value: &'static str, color: &str) {
    println!("  {BOLD}{label:<14}{RESET}{color}{value}{RESET}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_commit_handles_unknown() {
        let info = BannerInfo {
            commit: "unknown",
            ..BannerInfo::default()
        };
        assert_eq!(info.commit_short(), "unknown");

        let info = BannerInfo {
            commit: "0123456789abcdef",
            ..BannerInfo::default()
        };
        assert_eq!(info.commit_short(), "0123456");
    }
}
