use nulltrace_markup::{
    FileResource, MarkupError, MarkupFragment, MarkupParser, MarkupResourceStream, MarkupSettings,
};
use std::env;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let mut args: Vec<String> = env::args().skip(1).collect();

    let mut settings = MarkupSettings::default();
    if args.first().map(String::as_str) == Some("--settings") {
        if args.len() < 2 {
            usage();
        }
        let path = args[1].clone();
        args.drain(..2);
        settings = match MarkupSettings::from_file(&path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("✗ {}: {}", path, e);
                process::exit(1);
            }
        };
    }

    if args.is_empty() {
        usage();
    }

    let mut exit_code = 0;
    for file_path in &args {
        let stream = MarkupResourceStream::new(Arc::new(FileResource::new(file_path)));
        match MarkupParser::new(stream, &settings).parse() {
            Ok(markup) => {
                println!("✓ {} ({} elements)", file_path, markup.len());
                print_outline(markup.root(), 1);
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

fn usage() -> ! {
    eprintln!("Usage: markup-check [--settings settings.yaml] <file.html>...");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  markup-check HomePage.html");
    eprintln!("  markup-check --settings markup.yaml templates/*.html");
    process::exit(1);
}

fn print_outline(fragment: &MarkupFragment, depth: usize) {
    for child in fragment.fragments() {
        let id = child.id().unwrap_or("?");
        let marker = if child.is_auto() { " (auto)" } else { "" };
        println!("{}{}{}", "  ".repeat(depth), id, marker);
        print_outline(child, depth + 1);
    }
}

fn print_error(error: &MarkupError) {
    match error {
        MarkupError::ParseError {
            line,
            column,
            message,
            context,
            ..
        } => {
            eprintln!("  Parse error at line {}, column {}:", line, column);
            eprintln!("    {}", message);
            for line in context.lines() {
                eprintln!("    {}", line);
            }
        }
        MarkupError::UnbalancedTag { tag, expected, .. } => {
            eprintln!("  Close tag '{}' does not match open tag '{}'", tag, expected);
        }
        MarkupError::UnclosedTag { tag, .. } => {
            eprintln!("  Tag '{}' is never closed", tag);
        }
        MarkupError::ResourceRead { message, .. } => {
            eprintln!("  Could not read file:");
            eprintln!("    {}", message);
        }
        other => {
            eprintln!("  {}", other);
        }
    }
}
