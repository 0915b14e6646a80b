use glob::glob;
use std::path::Path;

fn is_pattern(arg: &str) -> bool {
    arg.contains('*') || arg.contains('?') || arg.contains('[')
}

/// All paths matching `pattern`, sorted. Invalid patterns match nothing.
pub fn get_files(pattern: &str) -> Vec<String> {
    let mut matched: Vec<String> = match glob(pattern) {
        Ok(paths) => paths
            .flatten()
            .map(|p| p.to_string_lossy().to_string())
            .collect(),
        Err(_) => Vec::new(),
    };
    matched.sort();
    matched
}

/// Expand glob arguments relative to `base`. Matches are returned relative
/// to `base` as well, so they stay valid for a command running there.
pub fn expand_globs(args: &[String], base: &Path) -> Vec<String> {
    let mut expanded_args = Vec::new();

    for arg in args {
        // Skip flags
        if arg.starts_with('-') || !is_pattern(arg) {
            expanded_args.push(arg.clone());
            continue;
        }

        let absolute = Path::new(arg).is_absolute();
        let pattern = if absolute {
            arg.clone()
        } else {
            base.join(arg).to_string_lossy().to_string()
        };

        let matched: Vec<String> = get_files(&pattern)
            .into_iter()
            .map(|m| {
                if absolute {
                    return m;
                }
                Path::new(&m)
                    .strip_prefix(base)
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or(m)
            })
            .collect();

        if matched.is_empty() {
            // No matches found, keep the argument as written (bash behavior)
            expanded_args.push(arg.clone());
        } else {
            expanded_args.extend(matched);
        }
    }
    expanded_args
}
