use std::net::SocketAddr;

use clap::Parser;
use searchlab::{
    DataDir,
    SearchIndex,
    error,
    lines::{self, LineQuery, LineSearch},
    server,
    symbols::{self, SymbolIndex},
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command, LinesArgs, SymbolsArgs};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("SEARCHLAB_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Command::Lines(args) => {
            let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
            cmd_lines(&data_dir, &args)?;
        }
        Command::Symbols(args) => {
            cmd_symbols(&args)?;
        }
        Command::Serve(args) => {
            server::run(SocketAddr::new(args.bind, args.port))?;
        }
        Command::Completions(args) => {
            args.generate();
        }
    }

    Ok(())
}

fn cmd_lines(data_dir: &DataDir, args: &LinesArgs) -> error::Result<()> {
    let dir = data_dir.lines_index_dir()?;

    let index = if args.skip_index {
        SearchIndex::open(&dir, lines::schema())?
    } else {
        if !args.docs.is_dir() {
            return Err(error::Error::Config(format!(
                "documents directory does not exist: {}",
                args.docs.display()
            )));
        }
        let index = SearchIndex::recreate(&dir, lines::schema())?;
        let count = lines::build_index(&index, &args.docs)?;
        if !args.json {
            println!(
                "Indexed {count} line(s) from {}",
                args.docs.display()
            );
        }
        index
    };

    if args.index_only {
        return Ok(());
    }

    let queries: Vec<LineQuery> =
        if args.queries.is_empty() && args.max_line.is_none() {
            lines::demo_queries()
        } else {
            args.queries
                .iter()
                .map(|q| LineQuery::Keyword(q.clone()))
                .chain(args.max_line.map(LineQuery::UpToLine))
                .collect()
        };

    let search = LineSearch::new(&index)?;
    let mut json_out = Vec::new();

    for query in &queries {
        let hits = search.run(query, args.limit)?;

        if args.json {
            json_out.push(json!({
                "query": query.to_string(),
                "hit_count": hits.len(),
                "hits": hits,
            }));
        } else {
            println!("\nSearching for {query}: {} hit(s)", hits.len());
            for hit in &hits {
                println!("  {hit}");
            }
        }
    }

    if args.json {
        println!("{}", serde_json::to_string(&json_out)?);
    }
    Ok(())
}

fn cmd_symbols(args: &SymbolsArgs) -> error::Result<()> {
    let found = symbols::scan_crate_sources(&args.root)?;
    let index = SymbolIndex::build(&found)?;

    let keywords: Vec<&str> = if args.keywords.is_empty() {
        symbols::DEMO_KEYWORDS.to_vec()
    } else {
        args.keywords.iter().map(String::as_str).collect()
    };

    let mut json_out = Vec::new();

    for keyword in keywords {
        let hits = index.search(keyword, args.limit, args.kind)?;

        if args.json {
            json_out.push(json!({
                "keyword": keyword,
                "hit_count": hits.len(),
                "hits": hits,
            }));
        } else {
            println!("\nSearching for '{keyword}': {} hit(s)", hits.len());
            for hit in &hits {
                let on = match hit.matched_on {
                    symbols::MatchedField::ItemName => "name",
                    symbols::MatchedField::ModulePath => "module",
                };
                println!("  [{on:>6}] {hit}");
            }
        }
    }

    if args.json {
        println!("{}", serde_json::to_string(&json_out)?);
    }
    Ok(())
}
