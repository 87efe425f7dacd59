use std::env;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "supernate.toml";

pub fn get_base_dir() -> PathBuf {
    let exe_dir = env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    if has_config_candidate(&exe_dir) {
        return exe_dir;
    }

    if let Ok(cwd) = env::current_dir() {
        if has_config_candidate(&cwd) {
            return cwd;
        }
        // Nothing found anywhere: create the default config where the user runs us.
        return cwd;
    }

    exe_dir
}

pub fn resolve_config_path(raw: Option<PathBuf>, base_dir: &Path) -> PathBuf {
    if let Some(path) = raw {
        if path.is_absolute() {
            return path;
        }
        if let Ok(cwd) = env::current_dir() {
            return cwd.join(path);
        }
        return path;
    }

    let candidates = [
        base_dir.join(CONFIG_FILE_NAME),
        base_dir.join("config").join(CONFIG_FILE_NAME),
    ];
    for path in candidates {
        if path.exists() {
            return path;
        }
    }

    base_dir.join(CONFIG_FILE_NAME)
}

fn has_config_candidate(base_dir: &Path) -> bool {
    base_dir.join(CONFIG_FILE_NAME).exists()
        || base_dir.join("config").join(CONFIG_FILE_NAME).exists()
}

#[cfg(test)]
mod tests {
    use super::{resolve_config_path, CONFIG_FILE_NAME};
    use std::fs;
    use std::path::PathBuf;

    fn scratch_dir(name: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("supernate_path_utils_{}_{}", name, std::process::id()));
        fs::create_dir_all(dir.join("config")).expect("create scratch dir");
        dir
    }

    #[test]
    fn explicit_absolute_path_wins() {
        let base = scratch_dir("explicit");
        let explicit = base.join("elsewhere.toml");
        assert_eq!(resolve_config_path(Some(explicit.clone()), &base), explicit);
        fs::remove_dir_all(base).ok();
    }

    #[test]
    fn finds_config_subdirectory_then_defaults_to_base() {
        let base = scratch_dir("lookup");
        assert_eq!(resolve_config_path(None, &base), base.join(CONFIG_FILE_NAME));

        let nested = base.join("config").join(CONFIG_FILE_NAME);
        fs::write(&nested, "").expect("write nested config");
        assert_eq!(resolve_config_path(None, &base), nested);

        fs::remove_dir_all(base).ok();
    }
}
