use genui_runtime::outline::render_outline;
use genui_runtime::loader::load_document_file;
use genui_runtime::{IrError, RenderOptions, Session};
use std::env;
use std::fs;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();

    let mut args: Vec<String> = env::args().skip(1).collect();

    let options = match take_config(&mut args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("✗ invalid --config:");
            print_error(&e);
            process::exit(1);
        }
    };

    if args.is_empty() {
        eprintln!("Usage: genui-check [--config options.yaml] <file.json|file.yaml>...");
        eprintln!();
        eprintln!("Examples:");
        eprintln!("  genui-check todo.json");
        eprintln!("  RUST_LOG=debug genui-check --config strict.yaml *.yaml");
        process::exit(1);
    }

    let mut exit_code = 0;

    for file_path in &args {
        match check_file(file_path, &options) {
            Ok(report) => {
                println!("✓ {} is valid", file_path);
                println!("{}", report);
            }
            Err(e) => {
                eprintln!("✗ {} has errors:", file_path);
                print_error(&e);
                exit_code = 1;
            }
        }
    }

    process::exit(exit_code);
}

/// Removes `--config <path>` from `args` and loads it.
fn take_config(args: &mut Vec<String>) -> Result<RenderOptions, IrError> {
    let Some(pos) = args.iter().position(|a| a == "--config") else {
        return Ok(RenderOptions::default());
    };
    args.remove(pos);
    if pos >= args.len() {
        return Err(IrError::InvalidOptions("--config needs a file path".to_string()));
    }
    let path = args.remove(pos);
    let content = fs::read_to_string(&path).map_err(|e| IrError::ReadError {
        path: path.clone(),
        message: e.to_string(),
    })?;
    RenderOptions::from_yaml(&content)
}

fn check_file(path: &str, options: &RenderOptions) -> Result<String, IrError> {
    let doc = load_document_file(path, options)?;
    let session = Session::from_document(&doc);

    let keys: Vec<String> = session.declared_keys().into_iter().collect();
    let mut report = format!("  state: [{}]\n", keys.join(", "));

    match render_outline(&session, doc.root_node(), options) {
        Ok(outline) => {
            for line in outline.lines() {
                report.push_str("  ");
                report.push_str(line);
                report.push('\n');
            }
        }
        Err(e) => report.push_str(&format!("  (outline unavailable: {})\n", e)),
    }
    Ok(report.trim_end().to_string())
}

fn print_error(error: &IrError) {
    match error {
        IrError::ReadError { path, message } => {
            eprintln!("  Cannot read '{}':", path);
            eprintln!("    {}", message);
        }
        IrError::JsonError(msg) => {
            eprintln!("  JSON error:");
            eprintln!("    {}", msg);
        }
        IrError::YamlError(msg) => {
            eprintln!("  YAML error:");
            eprintln!("    {}", msg);
        }
        IrError::EmptyDocument => {
            eprintln!("  Empty document: no root node found");
        }
        IrError::InvalidNode { location, reason } => {
            eprintln!("  Invalid node at '{}':", location);
            eprintln!("    {}", reason);
        }
        IrError::EmptyBinding { location, binding } => {
            eprintln!("  Empty binding '{}' at '{}'", binding, location);
            eprintln!("    Binding expressions must not be blank");
        }
        IrError::EmptyLoopIterable { location } => {
            eprintln!("  Empty loop iterable at '{}'", location);
        }
        IrError::InvalidStateKey { key, reason } => {
            eprintln!("  Invalid state key '{}':", key);
            eprintln!("    {}", reason);
        }
        IrError::MaxNestingDepthExceeded { max_depth, location } => {
            eprintln!("  Maximum nesting depth ({}) exceeded at '{}'", max_depth, location);
            eprintln!("    Nodes are nested too deeply");
        }
        e => {
            eprintln!("  {}", e);
        }
    }
}
