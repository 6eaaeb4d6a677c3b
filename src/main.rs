use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use filter_expr::{FilterConfig, FilterNode, FilterParser, OperatorRegistry, Page, ParseCache, SqlCompiler};

#[derive(Parser)]
#[command(name = "filter_expr", version)]
#[command(about = "Compile filter expressions into parametrised SQL", long_about = None)]
struct Cli {
    /// JSON 配置文件路径
    #[arg(long, default_value = "filter_config.json")]
    config: PathBuf,

    /// 只编译一个表达式后退出，不启动交互提示符
    #[arg(long)]
    expr: Option<String>,

    /// 行查询的页码（从 1 开始）
    #[arg(long, default_value_t = 1)]
    page: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = FilterConfig::from_json_file(&cli.config);
    let config = loaded.as_ref().cloned().unwrap_or_default();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.as_str().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &loaded {
        Ok(_) => info!(path = %cli.config.display(), "loaded configuration"),
        Err(e) => warn!(error = %e, "using default configuration"),
    }

    let parser = FilterParser::new(OperatorRegistry::new());
    let cache = ParseCache::new(parser, config.cache);
    let compiler = SqlCompiler::new(config.table.clone());
    let page = Page::new(cli.page, config.page_size);

    if let Some(expr) = cli.expr {
        let node = cache.parser().parse(&expr)?;
        return show(&compiler, Some(&node), page);
    }

    let mut rl = DefaultEditor::new()?;
    println!(
        "Filtering table `{}` (fields: {}). Empty line selects everything, Ctrl-D quits.",
        config.table.name,
        config.table.fields.keys().cloned().collect::<Vec<_>>().join(", ")
    );

    loop {
        match rl.readline("filter> ") {
            Ok(line) => {
                let text = line.trim();
                if !text.is_empty() {
                    rl.add_history_entry(text)?;
                }

                let node = match cache.get_or_parse(text) {
                    Ok(node) => node,
                    Err(e) => {
                        println!("✗ {}", e);
                        continue;
                    }
                };
                if node.is_none() && !text.is_empty() {
                    if let Err(e) = cache.parser().parse(text) {
                        println!("✗ {} (falling back to no filter)", e);
                    }
                }

                if let Err(e) = show(&compiler, node.as_deref(), page) {
                    println!("✗ {}", e);
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    let stats = cache.stats();
    info!(hits = stats.hits, misses = stats.misses, evictions = stats.evictions, "parse cache");
    Ok(())
}

fn show(compiler: &SqlCompiler, node: Option<&FilterNode>, page: Page) -> Result<()> {
    if let Some(node) = node {
        println!("[AST]:\n{}", serde_json::to_string_pretty(node)?);
    }

    let rows = compiler.select_page(node, page)?;
    println!("[SQL]:\n{}\n  values: {:?}", rows.sql, rows.values.0);

    let count = compiler.count(node)?;
    println!("[COUNT]:\n{}\n  values: {:?}", count.sql, count.values.0);
    Ok(())
}
