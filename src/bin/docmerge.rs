//! CLI binary for docmerge.
//!
//! A thin shim over the library crate that maps subcommands to [`Store`]
//! operations and prints results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docmerge::{RenderConfig, Store};
use std::io::{self, Read};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Upload a template (must contain the literal {{CONTENT}} placeholder
  # where the document text should go; without it, text is appended)
  docmerge template add letter.docx --name "Welcome letter"

  # List templates
  docmerge template ls

  # Create a document: URLs in the content get QR codes in the output
  docmerge doc create --template 1 --title "Hello" \
      --content "Welcome! Docs at https://example.com/start"

  # Content from a file (or stdin with --content -)
  docmerge doc create --template 1 --title "Hello" --content-file body.txt

  # Edit a document (regenerates the PDF)
  docmerge doc edit 1 --content "Updated text"

  # Copy a document's PDF somewhere
  docmerge doc export 1 -o ./hello.pdf

ARTIFACT LAYOUT (under --root, default ./wwwroot):
  catalog.json                     record metadata
  templates/<uuid>.docx            uploaded templates
  outputs/processed_*.docx         merged documents
  outputs/pdfs/*.pdf               rendered PDFs
  outputs/qrcodes/qrcode_*.png     QR code images

PDF CONVERSION:
  Full-fidelity conversion needs LibreOffice at the conventional install
  path (override with --soffice). Without it, a lossy text-only PDF is
  produced and marked "degraded" in the output.

ENVIRONMENT VARIABLES:
  DOCMERGE_ROOT       Artifact root directory (same as --root)
  DOCMERGE_SOFFICE    LibreOffice binary path (same as --soffice)
"#;

/// Merge text into .docx templates and render PDFs with QR codes for URLs.
#[derive(Parser, Debug)]
#[command(
    name = "docmerge",
    version,
    about = "Merge text into .docx templates and render PDFs with QR codes for URLs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Artifact root directory.
    #[arg(long, env = "DOCMERGE_ROOT", default_value = "wwwroot", global = true)]
    root: PathBuf,

    /// LibreOffice binary for full-fidelity PDF conversion.
    #[arg(long, env = "DOCMERGE_SOFFICE", global = true)]
    soffice: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage .docx templates.
    #[command(subcommand)]
    Template(TemplateCmd),
    /// Manage generated documents.
    #[command(subcommand)]
    Doc(DocCmd),
}

#[derive(Subcommand, Debug)]
enum TemplateCmd {
    /// Upload a .docx file as a new template.
    Add {
        /// Path to the .docx file.
        file: PathBuf,
        /// Display name; defaults to the file name.
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// List templates.
    Ls,
    /// Show one template.
    Show { id: u64 },
    /// Delete a template (documents made from it survive).
    Rm { id: u64 },
}

#[derive(Subcommand, Debug)]
enum DocCmd {
    /// Create a document from a template and render its PDF.
    Create {
        /// Template id to merge into.
        #[arg(long)]
        template: u64,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Document text; use --content-file for longer texts.
        #[arg(long, conflicts_with = "content_file")]
        content: Option<String>,
        /// Read the document text from a file ('-' for stdin).
        #[arg(long)]
        content_file: Option<PathBuf>,
    },
    /// Edit a document and regenerate its PDF.
    Edit {
        id: u64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, conflicts_with = "content_file")]
        content: Option<String>,
        #[arg(long)]
        content_file: Option<PathBuf>,
        /// Switch to a different template.
        #[arg(long)]
        template: Option<u64>,
    },
    /// List documents.
    Ls,
    /// Show one document.
    Show { id: u64 },
    /// Delete a document and its PDF.
    Rm { id: u64 },
    /// Copy a document's rendered PDF to a destination path.
    Export {
        id: u64,
        /// Destination; defaults to ./<document title>.pdf.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let mut builder = RenderConfig::builder().web_root(&cli.root);
    if let Some(ref soffice) = cli.soffice {
        builder = builder.soffice_path(soffice);
    }
    let config = builder.build().context("Invalid configuration")?;
    let mut store = Store::open(config).context("Failed to open store")?;

    match cli.command {
        Command::Template(cmd) => run_template(&mut store, cmd, cli.quiet).await,
        Command::Doc(cmd) => run_doc(&mut store, cmd, cli.quiet).await,
    }
}

async fn run_template(store: &mut Store, cmd: TemplateCmd, quiet: bool) -> Result<()> {
    match cmd {
        TemplateCmd::Add {
            file,
            name,
            description,
        } => {
            let name = name.unwrap_or_else(|| {
                file.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "template".to_string())
            });
            let t = store
                .add_template(&name, &description, &file)
                .await
                .context("Upload failed")?;
            if !quiet {
                println!(
                    "{} template {} {}  {}",
                    green("✔"),
                    bold(&t.id.to_string()),
                    t.name,
                    dim(&t.file_path)
                );
            }
        }
        TemplateCmd::Ls => {
            if store.templates().is_empty() {
                println!("{}", dim("no templates"));
            }
            for t in store.templates() {
                println!(
                    "{:>4}  {}  {}",
                    bold(&t.id.to_string()),
                    t.name,
                    dim(&t.uploaded_at.format("%Y-%m-%d %H:%M").to_string()),
                );
            }
        }
        TemplateCmd::Show { id } => {
            let t = store.template(id)?;
            println!("Id:            {}", t.id);
            println!("Name:          {}", t.name);
            if !t.description.is_empty() {
                println!("Description:   {}", t.description);
            }
            println!("File:          {}", t.file_path);
            println!("Uploaded as:   {}", t.original_file_name);
            println!("Uploaded at:   {}", t.uploaded_at.to_rfc3339());
        }
        TemplateCmd::Rm { id } => {
            store.delete_template(id)?;
            if !quiet {
                println!("{} template {} deleted", green("✔"), bold(&id.to_string()));
            }
        }
    }
    Ok(())
}

async fn run_doc(store: &mut Store, cmd: DocCmd, quiet: bool) -> Result<()> {
    match cmd {
        DocCmd::Create {
            template,
            title,
            description,
            content,
            content_file,
        } => {
            let content = read_content(content, content_file)?;
            let doc = store
                .create_document(&title, &description, &content, template)
                .await
                .context("Generation failed")?;
            if !quiet {
                println!(
                    "{} document {} {}  {}",
                    green("✔"),
                    bold(&doc.id.to_string()),
                    doc.title,
                    dim(doc.output_pdf_path.as_deref().unwrap_or("-")),
                );
            }
        }
        DocCmd::Edit {
            id,
            title,
            description,
            content,
            content_file,
            template,
        } => {
            let current = store.document(id)?.clone();
            let content = match (content, content_file) {
                (None, None) => current.content.clone(),
                (c, f) => read_content(c, f)?,
            };
            let doc = store
                .update_document(
                    id,
                    title.as_deref().unwrap_or(&current.title),
                    description.as_deref().unwrap_or(&current.description),
                    &content,
                    template.unwrap_or(current.template_id),
                )
                .await
                .context("Regeneration failed")?;
            if !quiet {
                println!(
                    "{} document {} regenerated  {}",
                    green("✔"),
                    bold(&doc.id.to_string()),
                    dim(doc.output_pdf_path.as_deref().unwrap_or("-")),
                );
            }
        }
        DocCmd::Ls => {
            if store.documents().is_empty() {
                println!("{}", dim("no documents"));
            }
            for d in store.documents() {
                println!(
                    "{:>4}  {}  {} {}",
                    bold(&d.id.to_string()),
                    d.title,
                    dim(&format!("template {}", d.template_id)),
                    dim(&d.created_at.format("%Y-%m-%d %H:%M").to_string()),
                );
            }
        }
        DocCmd::Show { id } => {
            let d = store.document(id)?;
            println!("Id:            {}", d.id);
            println!("Title:         {}", d.title);
            if !d.description.is_empty() {
                println!("Description:   {}", d.description);
            }
            println!("Template:      {}", d.template_id);
            match store.document_pdf(id) {
                Ok(pdf) => println!("PDF:           {}", pdf.display()),
                Err(_) => println!(
                    "PDF:           {} {}",
                    d.output_pdf_path.as_deref().unwrap_or("-"),
                    dim("(missing)")
                ),
            }
            println!("Created at:    {}", d.created_at.to_rfc3339());
            if let Some(m) = d.modified_at {
                println!("Modified at:   {}", m.to_rfc3339());
            }
            println!("{}", cyan("── Content ──"));
            println!("{}", d.content);
        }
        DocCmd::Rm { id } => {
            store.delete_document(id)?;
            if !quiet {
                println!("{} document {} deleted", green("✔"), bold(&id.to_string()));
            }
        }
        DocCmd::Export { id, output } => {
            let pdf = store.document_pdf(id)?;
            let dest = match output {
                Some(p) => p,
                None => PathBuf::from(format!("{}.pdf", store.document(id)?.title)),
            };
            tokio::fs::copy(&pdf, &dest)
                .await
                .with_context(|| format!("Failed to copy PDF to {}", dest.display()))?;
            if !quiet {
                println!("{} {}", green("✔"), bold(&dest.display().to_string()));
            }
        }
    }
    Ok(())
}

/// Resolve document text from --content / --content-file ('-' = stdin).
fn read_content(content: Option<String>, file: Option<PathBuf>) -> Result<String> {
    match (content, file) {
        (Some(c), _) => Ok(c),
        (None, Some(path)) if path.as_os_str() == "-" => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read content from stdin")?;
            Ok(buf)
        }
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read content from {}", path.display())),
        (None, None) => anyhow::bail!("provide --content or --content-file"),
    }
}
