use std::path::{Path, PathBuf};

use cg_core::config::SessionConfig;

/// Credential directory the daemon uses without a config file.
pub fn default_dir() -> PathBuf {
    PathBuf::from(SessionConfig::default().credentials_dir)
}

/// Remove the credential directory and every `*.log` file directly inside
/// `workdir`. Missing files are not an error.
pub fn run(credentials_dir: &Path, workdir: &Path) -> anyhow::Result<()> {
    let removed = clean(credentials_dir, workdir)?;
    if removed.is_empty() {
        println!("Nothing to clean.");
    } else {
        for path in &removed {
            println!("removed {}", path.display());
        }
        println!("Next start will need a new pairing.");
    }
    Ok(())
}

fn clean(credentials_dir: &Path, workdir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut removed = Vec::new();

    if credentials_dir.is_dir() {
        std::fs::remove_dir_all(credentials_dir)?;
        removed.push(credentials_dir.to_path_buf());
    }

    for entry in std::fs::read_dir(workdir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "log") {
            std::fs::remove_file(&path)?;
            removed.push(path);
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_credentials_and_logs_only() {
        let tmp = tempfile::tempdir().unwrap();
        let creds = tmp.path().join("auth_info");
        std::fs::create_dir_all(creds.join("keys")).unwrap();
        std::fs::write(creds.join("keys/creds.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("server.log"), "x").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "keep").unwrap();

        let removed = clean(&creds, tmp.path()).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(!creds.exists());
        assert!(!tmp.path().join("server.log").exists());
        assert!(tmp.path().join("notes.txt").exists());
    }

    #[test]
    fn nothing_to_clean_is_ok() {
        let tmp = tempfile::tempdir().unwrap();
        let removed = clean(&tmp.path().join("missing"), tmp.path()).unwrap();
        assert!(removed.is_empty());
        assert!(run(&tmp.path().join("missing"), tmp.path()).is_ok());
    }

    #[test]
    fn default_dir_matches_daemon_default() {
        assert_eq!(default_dir(), PathBuf::from("./auth_info"));
    }
}
