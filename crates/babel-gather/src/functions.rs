use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use serde_json::{Map, Value, json};

use crate::plan::SourceType;
use crate::result::{GatherResult, count_lines};
use babel_core::BabelPaths;
use babel_index::SymbolCache;

// Pure I/O primitives for context gathering. No orchestrator
// dependency: each takes simple inputs, returns a GatherResult, and
// never raises past its boundary.

/// Files larger than this are rejected outright.
const MAX_FILE_BYTES: u64 = 1024 * 1024;
/// Command output beyond this is truncated.
const MAX_BASH_OUTPUT: usize = 100 * 1024;
/// Subprocess search timeout.
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

static RIPGREP_AVAILABLE: Lazy<bool> = Lazy::new(|| {
    Command::new("rg")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
});

/// Gather content from a file.
///
/// Rejects missing paths, directories, oversize and binary files.
/// Invalid UTF-8 falls back to a latin-1 read.
pub fn gather_file(path: &str) -> GatherResult {
    let start = Instant::now();
    let file_path = Path::new(path);

    if !file_path.exists() {
        return GatherResult::error_result(
            SourceType::File,
            path,
            format!("File not found: {}", path),
            elapsed_ms(start),
        );
    }
    if file_path.is_dir() {
        return GatherResult::error_result(
            SourceType::File,
            path,
            format!("Path is a directory: {}", path),
            elapsed_ms(start),
        );
    }

    let size = match std::fs::metadata(file_path) {
        Ok(meta) => meta.len(),
        Err(err) => {
            return GatherResult::error_result(
                SourceType::File,
                path,
                err.to_string(),
                elapsed_ms(start),
            );
        }
    };
    if size > MAX_FILE_BYTES {
        return GatherResult::error_result(
            SourceType::File,
            path,
            format!(
                "File too large: {:.1}KB (max: {}KB)",
                size as f64 / 1024.0,
                MAX_FILE_BYTES / 1024
            ),
            elapsed_ms(start),
        );
    }

    let bytes = match std::fs::read(file_path) {
        Ok(bytes) => bytes,
        Err(err) => {
            return GatherResult::error_result(
                SourceType::File,
                path,
                err.to_string(),
                elapsed_ms(start),
            );
        }
    };

    if bytes.contains(&0) {
        return GatherResult::error_result(
            SourceType::File,
            path,
            "Binary file detected",
            elapsed_ms(start),
        );
    }

    let (content, encoding) = match String::from_utf8(bytes) {
        Ok(text) => (text, "utf-8"),
        // latin-1 maps every byte to a char, so this cannot fail
        Err(err) => (
            err.into_bytes().iter().map(|&b| b as char).collect(),
            "latin-1",
        ),
    };

    let absolute = file_path
        .canonicalize()
        .unwrap_or_else(|_| file_path.to_path_buf());
    let mut metadata = Map::new();
    metadata.insert("encoding".into(), json!(encoding));
    metadata.insert("absolute_path".into(), json!(absolute.to_string_lossy()));

    GatherResult::ok(SourceType::File, path, content, elapsed_ms(start), metadata)
}

/// Gather grep search results. Prefers ripgrep, falls back to POSIX
/// grep. Exit code 1 (no matches) is success, not an error.
pub fn gather_grep(
    pattern: &str,
    path: &str,
    max_matches: usize,
    context_lines: usize,
) -> GatherResult {
    let start = Instant::now();

    let mut cmd = if *RIPGREP_AVAILABLE {
        let mut cmd = Command::new("rg");
        cmd.args(["--line-number", "--no-heading", "--color=never"]);
        cmd.arg(format!("--max-count={}", max_matches));
        if context_lines > 0 {
            cmd.arg(format!("-C{}", context_lines));
        }
        cmd.arg(pattern).arg(path);
        cmd
    } else {
        let mut cmd = Command::new("grep");
        cmd.args(["-rn", "--color=never"]);
        if context_lines > 0 {
            cmd.args(["-C", &context_lines.to_string()]);
        }
        cmd.arg(pattern).arg(path);
        cmd
    };

    let output = match run_with_timeout(&mut cmd, SEARCH_TIMEOUT) {
        Ok(output) => output,
        Err(err) => {
            return GatherResult::error_result(
                SourceType::Grep,
                pattern,
                err.to_string(),
                elapsed_ms(start),
            );
        }
    };

    if output.timed_out {
        return GatherResult::error_result(
            SourceType::Grep,
            pattern,
            "Search timed out",
            elapsed_ms(start),
        );
    }

    // grep and rg exit 1 when nothing matched
    if !matches!(output.exit_code, Some(0) | Some(1)) {
        return GatherResult::error_result(
            SourceType::Grep,
            pattern,
            format!("Search failed: {}", output.stderr.trim()),
            elapsed_ms(start),
        );
    }

    let content = output.stdout;
    let match_count = content
        .lines()
        .filter(|l| !l.is_empty() && !l.starts_with("--"))
        .count();

    let mut metadata = Map::new();
    metadata.insert("path".into(), json!(path));
    metadata.insert("match_count".into(), json!(match_count));
    metadata.insert(
        "tool".into(),
        json!(if *RIPGREP_AVAILABLE { "rg" } else { "grep" }),
    );
    metadata.insert("max_matches".into(), json!(max_matches));

    GatherResult::ok(
        SourceType::Grep,
        pattern,
        content,
        elapsed_ms(start),
        metadata,
    )
}

/// Gather output from a shell command: stdout plus stderr behind a
/// separator, truncated at 100KB, with the exit code surfaced.
pub fn gather_bash(command: &str, timeout: Duration, cwd: Option<&str>) -> GatherResult {
    let start = Instant::now();

    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }

    let output = match run_with_timeout(&mut cmd, timeout) {
        Ok(output) => output,
        Err(err) => {
            return GatherResult::error_result(
                SourceType::Bash,
                command,
                err.to_string(),
                elapsed_ms(start),
            );
        }
    };

    if output.timed_out {
        return GatherResult::error_result(
            SourceType::Bash,
            command,
            format!("Command timed out after {:.0}s", timeout.as_secs_f64()),
            elapsed_ms(start),
        );
    }

    let mut combined = output.stdout;
    if !output.stderr.is_empty() {
        combined.push_str("\n--- STDERR ---\n");
        combined.push_str(&output.stderr);
    }

    let truncated = combined.len() > MAX_BASH_OUTPUT;
    if truncated {
        combined.truncate(MAX_BASH_OUTPUT);
        combined.push_str("\n... (truncated)");
    }

    let exit_code = output.exit_code.unwrap_or(-1);
    let mut metadata = Map::new();
    metadata.insert("exit_code".into(), json!(exit_code));
    metadata.insert(
        "cwd".into(),
        json!(cwd.map(String::from).unwrap_or_else(|| {
            std::env::current_dir()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default()
        })),
    );
    metadata.insert("truncated".into(), json!(truncated));

    let size_bytes = combined.len() as u64;
    let line_count = count_lines(&combined);

    GatherResult {
        source_type: SourceType::Bash,
        source_ref: command.to_string(),
        content: combined,
        size_bytes,
        line_count,
        success: exit_code == 0,
        error: if exit_code != 0 {
            Some(format!("Exit code: {}", exit_code))
        } else {
            None
        },
        duration_ms: elapsed_ms(start),
        gathered_at: chrono::Utc::now().to_rfc3339(),
        metadata,
    }
}

/// Gather file paths matching a glob pattern: files only, sorted, with
/// the total size reported in metadata.
pub fn gather_glob(pattern: &str, base_path: &str) -> GatherResult {
    let start = Instant::now();

    let full_pattern = if pattern.starts_with('/') {
        pattern.to_string()
    } else {
        Path::new(base_path)
            .join(pattern)
            .to_string_lossy()
            .to_string()
    };

    let paths = match glob::glob(&full_pattern) {
        Ok(paths) => paths,
        Err(err) => {
            return GatherResult::error_result(
                SourceType::Glob,
                pattern,
                err.to_string(),
                elapsed_ms(start),
            );
        }
    };

    let mut matches: Vec<PathBuf> = paths
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .collect();
    matches.sort();

    let total_size: u64 = matches
        .iter()
        .filter_map(|path| std::fs::metadata(path).ok())
        .map(|meta| meta.len())
        .sum();

    let content = matches
        .iter()
        .map(|path| path.to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("\n");

    let mut metadata = Map::new();
    metadata.insert("base_path".into(), json!(base_path));
    metadata.insert("match_count".into(), json!(matches.len()));
    metadata.insert("total_file_size".into(), json!(total_size));

    GatherResult::ok(
        SourceType::Glob,
        pattern,
        content,
        elapsed_ms(start),
        metadata,
    )
}

/// Gather code for a symbol by name.
///
/// Walks up from `project_dir` to the nearest `.babel`, resolves the
/// first symbol whose simple or qualified name matches
/// case-insensitively, and loads only the relevant line range.
pub fn gather_symbol(name: &str, project_dir: Option<&str>, context_lines: usize) -> GatherResult {
    let start = Instant::now();

    let search_from = project_dir
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let paths = match BabelPaths::discover(&search_from) {
        Ok(paths) => paths,
        Err(_) => {
            return GatherResult::error_result(
                SourceType::Symbol,
                name,
                "No .babel directory found (run: babel map --index)",
                elapsed_ms(start),
            );
        }
    };

    let cache_path = paths.symbol_cache_path();
    if !cache_path.exists() {
        return GatherResult::error_result(
            SourceType::Symbol,
            name,
            "Symbol index not found (run: babel map --index)",
            elapsed_ms(start),
        );
    }

    let cache = match SymbolCache::load(&cache_path) {
        Ok(cache) => cache,
        Err(err) => {
            return GatherResult::error_result(
                SourceType::Symbol,
                name,
                format!("Failed to read symbol cache: {}", err),
                elapsed_ms(start),
            );
        }
    };

    let name_lower = name.to_lowercase();
    let Some(symbol) = cache.symbols.iter().find(|s| {
        s.name.to_lowercase() == name_lower
            || s.qualified_name.to_lowercase().ends_with(&name_lower)
    }) else {
        return GatherResult::error_result(
            SourceType::Symbol,
            name,
            format!("Symbol not found: {}", name),
            elapsed_ms(start),
        );
    };

    let full_path = paths.project_root().join(&symbol.file_path);
    if !full_path.exists() {
        return GatherResult::error_result(
            SourceType::Symbol,
            name,
            format!("Source file not found: {}", symbol.file_path),
            elapsed_ms(start),
        );
    }

    let source = match std::fs::read_to_string(&full_path) {
        Ok(source) => source,
        Err(err) => {
            return GatherResult::error_result(
                SourceType::Symbol,
                name,
                err.to_string(),
                elapsed_ms(start),
            );
        }
    };
    let lines: Vec<&str> = source.lines().collect();

    let start_idx = symbol.line_start.saturating_sub(1).saturating_sub(context_lines);
    let end_idx = (symbol.line_end + context_lines).min(lines.len());
    let extracted = lines[start_idx..end_idx].join("\n");

    let mut header = format!(
        "# Symbol: {}\n# Type: {}\n# File: {}:{}-{}\n",
        symbol.qualified_name,
        symbol.symbol_type,
        symbol.file_path,
        symbol.line_start,
        symbol.line_end
    );
    if !symbol.signature.is_empty() {
        header.push_str(&format!("# Signature: {}\n", symbol.signature));
    }
    header.push_str(&format!(
        "# Lines: {}-{} (context: {})\n\n",
        start_idx + 1,
        end_idx,
        context_lines
    ));

    let mut metadata = Map::new();
    metadata.insert("qualified_name".into(), json!(symbol.qualified_name));
    metadata.insert("symbol_type".into(), json!(symbol.symbol_type));
    metadata.insert("file_path".into(), json!(symbol.file_path));
    metadata.insert("line_start".into(), json!(symbol.line_start));
    metadata.insert("line_end".into(), json!(symbol.line_end));
    metadata.insert("context_lines".into(), json!(context_lines));

    GatherResult::ok(
        SourceType::Symbol,
        name,
        header + &extracted,
        elapsed_ms(start),
        metadata,
    )
}

/// Quick size estimate from stat, without reading content.
pub fn estimate_file_size(path: &str) -> u64 {
    std::fs::metadata(path).map(|meta| meta.len()).unwrap_or(0)
}

/// Rough grep result estimate: cheap match pre-count times an average
/// line cost.
pub fn estimate_grep_size(pattern: &str, path: &str) -> u64 {
    let mut cmd = if *RIPGREP_AVAILABLE {
        let mut cmd = Command::new("rg");
        cmd.args(["-c", "--no-heading", "--color=never"]);
        cmd.arg(pattern).arg(path);
        cmd
    } else {
        let mut cmd = Command::new("grep");
        cmd.args(["-rc"]);
        cmd.arg(pattern).arg(path);
        cmd
    };

    let output = match run_with_timeout(&mut cmd, Duration::from_secs(5)) {
        Ok(output) if !output.timed_out => output,
        _ => return 0,
    };

    let total_matches: u64 = output
        .stdout
        .lines()
        .filter_map(|line| line.rsplit(':').next())
        .filter_map(|count| count.trim().parse::<u64>().ok())
        .sum();

    // ~100 bytes per match line
    total_matches * 100
}

struct TimedOutput {
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
    timed_out: bool,
}

/// Run a command with piped output and a hard deadline. Readers drain
/// both pipes on separate threads so large output cannot deadlock the
/// poll loop; on timeout the child is killed.
fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> std::io::Result<TimedOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn()?;

    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let mut timed_out = false;
    let exit_code = loop {
        match child.try_wait()? {
            Some(status) => break status.code(),
            None => {
                if Instant::now() >= deadline {
                    timed_out = true;
                    let _ = child.kill();
                    let _ = child.wait();
                    break None;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    };

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();

    Ok(TimedOutput {
        exit_code,
        stdout,
        stderr,
        timed_out,
    })
}

fn spawn_reader<R: Read + Send + 'static>(
    source: Option<R>,
) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut source) = source {
            let _ = source.read_to_end(&mut buffer);
        }
        String::from_utf8_lossy(&buffer).to_string()
    })
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
