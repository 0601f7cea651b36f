use clap::{Parser, ValueEnum};
use globset::{Glob, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;
use viewmerge::{
    FormatRegistry, MergeConfig, Processor, Result, Variables, collect_view_paths,
    layout_file_name, view_suffix,
};

const LONG_HELP: &str = r#"
Directives:
  <!-- @variables ... -->        - Declare variables (name = value per line)
  <!-- @variables:site.props --> - Import variables from a config-dir file
  @( name )                      - Placeholder replaced by a variable's value
  <!-- @nav begin/end -->        - Define a named section in a view
  <!-- @nav --> / <!-- @nav? --> - Section slot in a layout (? = optional)
  <!-- @doBody -->               - Body slot in a layout (exactly one)
  __layout variable              - Names the layout document to merge with

Examples:
  # Merge a views tree into its sibling `views` output directory
  viewmerge WebContent/WEB-INF/__views
  # Custom output and config directories
  viewmerge __views -o ../public -c __config
  # Only some suffixes, drop blank lines
  viewmerge __views -s .jsp,.jspx --remove-blank-lines
  # Check what would be processed (dry run)
  viewmerge __views --dry-run
  # List views with their layouts
  viewmerge __views --list=detailed
  # Output as JSON for scripting
  viewmerge __views --list=json


For more information, visit: https://github.com/0x484558/viewmerge
"#;

/// View/layout composition for page template trees.
///
/// Copyright 2025 0x484558 @ aleph0 s.r.o.
/// Licensed under the EUPL v1.2.
#[derive(Parser, Debug)]
#[command(
    name = "viewmerge",
    version,
    author = "0x484558 @ aleph0 s.r.o.",
    about = "View/layout composition for page template trees.",
    after_long_help = LONG_HELP,
    after_help = "For more information, visit: https://github.com/0x484558/viewmerge"
)]
struct Cli {
    /// Input views directory
    #[arg(value_name = "INPUT_DIR", env = "VIEWMERGE_INPUT_DIR")]
    input_dir: PathBuf,

    /// Output directory; relative paths resolve against the input's parent
    #[arg(short, long, value_name = "DIR", default_value = "views")]
    output_dir: PathBuf,

    /// Config directory holding layouts and variable files; relative paths
    /// resolve inside the input directory
    #[arg(short, long, value_name = "DIR", default_value = "__config")]
    config_dir: PathBuf,

    /// Comma-separated view file suffixes
    #[arg(short, long, value_name = "SUFFIXES", default_value = ".jsp,.jspx,.xhtml,.peb")]
    suffixes: String,

    /// Strip all-whitespace lines from views and layouts
    #[arg(long)]
    remove_blank_lines: bool,

    /// Append the merged variable table to each view output
    #[arg(long)]
    debug_variables: bool,

    /// Exclude glob patterns (repeatable), relative to the input directory
    #[arg(short = 'x', long = "exclude", value_name = "GLOB", action = clap::ArgAction::Append)]
    exclude: Vec<String>,

    /// Perform a dry run - validate views and layouts without writing output
    #[arg(long, conflicts_with = "list")]
    dry_run: bool,

    /// List views in the input tree (optionally with format: plain, detailed, json)
    #[arg(long, value_name = "FORMAT", num_args = 0..=1, default_missing_value = "plain", conflicts_with = "dry_run")]
    list: Option<ListFormat>,

    /// Increase verbosity (can be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq)]
enum ListFormat {
    /// Simple list of view paths
    Plain,
    /// Detailed information about each view
    Detailed,
    /// JSON output for scripting
    Json,
}

#[derive(Serialize, Deserialize)]
struct ViewInfo {
    view: String,
    format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    layout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    layout_exists: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    let config = build_config(&cli);

    let result = if cli.dry_run {
        dry_run(&config)
    } else if let Some(list_format) = cli.list {
        list_views(&config, list_format)
    } else {
        process(config)
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("VIEWMERGE_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_config(cli: &Cli) -> MergeConfig {
    let mut config = MergeConfig::new(cli.input_dir.clone());

    if cli.output_dir.is_absolute() {
        config.output_dir = cli.output_dir.clone();
    } else {
        config.output_dir = cli
            .input_dir
            .parent()
            .map_or_else(|| cli.output_dir.clone(), |parent| parent.join(&cli.output_dir));
    }
    if cli.config_dir.is_absolute() {
        config.config_dir = cli.config_dir.clone();
    } else {
        config.config_dir = cli.input_dir.join(&cli.config_dir);
    }

    config.view_suffixes = cli
        .suffixes
        .split(',')
        .map(str::trim)
        .filter(|suffix| !suffix.is_empty())
        .map(String::from)
        .collect();
    config.remove_blank_lines = cli.remove_blank_lines;
    config.debug_variables = cli.debug_variables;

    if !cli.exclude.is_empty() {
        let mut builder = GlobSetBuilder::new();
        for pat in &cli.exclude {
            match Glob::new(pat) {
                Ok(g) => {
                    builder.add(g);
                }
                Err(e) => {
                    eprintln!("[ERROR] Invalid exclude pattern '{pat}': {e}");
                    std::process::exit(2);
                }
            }
        }
        match builder.build() {
            Ok(set) => {
                config.exclude = Some(set);
            }
            Err(e) => {
                eprintln!("[ERROR] Failed to build exclude set: {e}");
                std::process::exit(2);
            }
        }
    }

    config
}

fn process(config: MergeConfig) -> Result<()> {
    info!(
        input = %config.input_dir.display(),
        output = %config.output_dir.display(),
        "merging views"
    );

    let mut processor = Processor::new(config, FormatRegistry::default());
    processor.run()?;

    info!("processing complete");
    Ok(())
}

fn inspect_view(config: &MergeConfig, registry: &FormatRegistry, relative: &Path) -> Result<ViewInfo> {
    let view_name = relative
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut lines = viewmerge::source::read_lines(&config.input_dir.join(relative))?;
    let mut variables = Variables::new();
    viewmerge::variables::parse_inline_variables(&mut lines, &view_name, &mut variables)?;

    let layout = layout_file_name(&view_name, &variables)?;
    let layout_exists = layout
        .as_ref()
        .map(|layout| config.config_dir.join(layout).is_file());

    Ok(ViewInfo {
        view: relative.display().to_string(),
        format: registry.lookup(view_suffix(&view_name)).to_string(),
        layout,
        layout_exists,
        error: None,
    })
}

fn dry_run(config: &MergeConfig) -> Result<()> {
    info!("performing dry run - validating views");

    let registry = FormatRegistry::default();
    let views = collect_view_paths(config)?;
    let total = views.len();

    let mut valid_count = 0;
    let mut invalid_count = 0;

    for relative in &views {
        match inspect_view(config, &registry, relative) {
            Ok(info) => match (&info.layout, info.layout_exists) {
                (Some(layout), Some(true)) => {
                    println!("✓ {} -> {layout}", relative.display());
                    valid_count += 1;
                }
                (Some(layout), _) => {
                    println!("✗ {} -> {layout} (not found)", relative.display());
                    invalid_count += 1;
                }
                (None, _) => {
                    println!("✓ {} (no layout)", relative.display());
                    valid_count += 1;
                }
            },
            Err(e) => {
                println!("✗ {} -> Error: {e}", relative.display());
                invalid_count += 1;
            }
        }
    }

    println!("\nSummary: {total} views found");
    if valid_count > 0 {
        println!("  ✓ {valid_count} valid");
    }
    if invalid_count > 0 {
        println!("  ✗ {invalid_count} invalid");
        std::process::exit(1);
    }

    Ok(())
}

fn list_views(config: &MergeConfig, format: ListFormat) -> Result<()> {
    let registry = FormatRegistry::default();
    let views = collect_view_paths(config)?;

    match format {
        ListFormat::Plain => {
            for relative in &views {
                println!("{}", relative.display());
            }
        }
        ListFormat::Detailed => {
            for relative in &views {
                println!("View: {}", relative.display());
                match inspect_view(config, &registry, relative) {
                    Ok(info) => {
                        println!("  Format: {}", info.format);
                        match (info.layout, info.layout_exists) {
                            (Some(layout), exists) => {
                                println!("  Layout: {layout}");
                                println!(
                                    "  Layout exists: {}",
                                    if exists == Some(true) { "yes" } else { "no" }
                                );
                            }
                            (None, _) => println!("  Layout: (none)"),
                        }
                    }
                    Err(e) => {
                        println!("  Error: {e}");
                    }
                }
                println!();
            }
        }
        ListFormat::Json => {
            let infos: Vec<ViewInfo> = views
                .iter()
                .map(|relative| {
                    inspect_view(config, &registry, relative).unwrap_or_else(|e| ViewInfo {
                        view: relative.display().to_string(),
                        format: registry
                            .lookup(view_suffix(&relative.to_string_lossy()))
                            .to_string(),
                        layout: None,
                        layout_exists: None,
                        error: Some(e.to_string()),
                    })
                })
                .collect();

            let json = serde_json::to_string_pretty(&infos)?;
            println!("{json}");
        }
    }

    Ok(())
}
