use clap::{Parser, Subcommand};
use rfshot::{RenderJob, RenderOutput, RendererConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rfshot", version, about = "Render HTML templates to images with headless Chrome")]
struct Cli {
    /// Log debug output (also enabled by RFSHOT_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a template once and write the image(s)
    Render {
        /// Render name; groups the intermediate html under temp/html/<name>
        #[arg(long)]
        name: String,
        /// Template file
        #[arg(long)]
        tpl: PathBuf,
        /// Template data as a JSON object
        #[arg(long)]
        data: Option<String>,
        /// Read template data from a JSON file
        #[arg(long, conflicts_with = "data")]
        data_file: Option<PathBuf>,
        /// Renderer config (YAML)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Split tall content into pages
        #[arg(long)]
        multi_page: bool,
        /// Directory the images are written to
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

/// Filter for the stderr subscriber: `--verbose` wins, then `RFSHOT_LOG`,
/// then `info`.
fn log_filter(verbose: bool, from_env: Option<&str>) -> EnvFilter {
    if verbose {
        return EnvFilter::new("debug");
    }
    from_env
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn init_logging(verbose: bool) {
    let from_env = std::env::var("RFSHOT_LOG").ok();
    // Also installs the `log` bridge the library logs through.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose, from_env.as_deref()))
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_data(data: Option<String>, data_file: Option<PathBuf>) -> anyhow::Result<serde_json::Value> {
    let raw = match (data, data_file) {
        (Some(s), _) => s,
        (None, Some(path)) => std::fs::read_to_string(&path)?,
        (None, None) => "{}".to_string(),
    };
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    if !value.is_object() {
        anyhow::bail!("template data must be a JSON object");
    }
    Ok(value)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let Command::Render {
        name,
        tpl,
        data,
        data_file,
        config,
        multi_page,
        out,
    } = cli.command;

    let config = match config {
        Some(path) => RendererConfig::from_file(path)?,
        None => RendererConfig::default(),
    };

    let mut data = load_data(data, data_file)?;
    if let Some(obj) = data.as_object_mut() {
        obj.insert("tplFile".into(), serde_json::json!(tpl));
        if multi_page {
            obj.insert("multiPage".into(), serde_json::Value::Bool(true));
        }
    }
    let ext = RenderJob::from_value(&data)?
        .screenshot_options()
        .image_type
        .extension();

    let plugin = rfshot::renderer(config)?;
    let output = plugin
        .render(&name, data)
        .await
        .ok_or_else(|| anyhow::anyhow!("render of {} failed", name))?;

    std::fs::create_dir_all(&out)?;
    let files: Vec<PathBuf> = match output {
        RenderOutput::Single(img) => {
            let path = out.join(format!("{}.{}", name, ext));
            std::fs::write(&path, img)?;
            vec![path]
        }
        RenderOutput::Pages(pages) => pages
            .into_iter()
            .enumerate()
            .map(|(i, img)| {
                let path = out.join(format!("{}-{}.{}", name, i + 1, ext));
                std::fs::write(&path, img).map(|_| path)
            })
            .collect::<std::io::Result<_>>()?,
    };

    for file in files {
        println!("{}", file.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_overrides_env() {
        assert_eq!(log_filter(true, Some("error")).to_string(), "debug");
    }

    #[test]
    fn test_env_filter_falls_back_to_info() {
        assert_eq!(log_filter(false, None).to_string(), "info");
        assert_eq!(log_filter(false, Some("rfshot=trace")).to_string(), "rfshot=trace");
    }
}
