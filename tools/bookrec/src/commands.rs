use anyhow::{Context, Result};
use book_recommender_core::{AbortSignal, RecommenderConfig, Stage};
use book_recommender_engine::{BookRecommender, Lookup, NotFound, TrainingManifest};
use colored::Colorize;

/// Titles suggested when a query matches nothing exactly
const MAX_SUGGESTIONS: usize = 5;

pub async fn train(config: RecommenderConfig, from: Stage) -> Result<()> {
    println!("{}", "Training recommender...".cyan().bold());
    println!(
        "  {} {}",
        "Artifacts:".cyan(),
        config.artifacts.artifacts_dir.display()
    );
    println!("  {} {}\n", "Metric:".cyan(), config.model.metric);

    let abort = AbortSignal::new();
    let pipeline = BookRecommender::new(config)
        .pipeline()
        .with_abort_signal(abort.clone());

    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current stage");
            abort.abort();
        }
    });

    let result = tokio::task::spawn_blocking(move || pipeline.run_from(from))
        .await
        .context("training task failed")?;
    ctrl_c.abort();

    let manifest = result?;
    print_manifest(&manifest);

    println!("\n{}", "Training completed successfully!".green().bold());
    Ok(())
}

fn print_manifest(manifest: &TrainingManifest) {
    println!("  {} {}", "Run:".cyan(), manifest.run_id);
    println!(
        "  {} {}",
        "Trained at:".cyan(),
        manifest.trained_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "  {} {} titles x {} users ({})",
        "Matrix:".cyan(),
        manifest.matrix_tag.rows,
        manifest.matrix_tag.cols,
        manifest.matrix_tag
    );

    if let Some(report) = &manifest.cleaning {
        println!("  {}", "Cleaning:".cyan());
        println!("    raw ratings          {}", report.raw_interactions);
        println!("    catalog records      {}", report.catalog_records);
        println!("    active users         {}", report.active_users);
        println!("    joined ratings       {}", report.joined_interactions);
        println!("    popular titles       {}", report.retained_titles);
        println!("    duplicates dropped   {}", report.duplicates_dropped);
        println!("    cleaned ratings      {}", report.cleaned_interactions);
    }
}

/// Print recommendations for `title`; returns `false` on a not-found outcome
pub fn recommend(config: RecommenderConfig, title: &str, json: bool) -> Result<bool> {
    let service = BookRecommender::new(config).service();

    match service.recommend(title)? {
        Lookup::Found(books) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&books)?);
                return Ok(true);
            }

            println!(
                "{} {}\n",
                "Books similar to".cyan().bold(),
                title.white().bold()
            );
            for (rank, book) in books.iter().enumerate() {
                println!(
                    "  {}. {} {}",
                    rank + 1,
                    book.title.white(),
                    format!("(distance {:.3})", book.distance).dimmed()
                );
                println!("     {}", book.poster_url.dimmed());
            }
            Ok(true)
        }
        Lookup::NotFound(NotFound::Title(missing)) => {
            if json {
                let body = serde_json::json!({ "error": "title_not_found", "title": missing });
                println!("{}", serde_json::to_string_pretty(&body)?);
                return Ok(false);
            }

            println!("{} {}", "Title not found:".yellow().bold(), missing);
            let needle = missing.to_lowercase();
            let suggestions: Vec<String> = service
                .titles()?
                .into_iter()
                .filter(|candidate| candidate.to_lowercase().contains(&needle))
                .take(MAX_SUGGESTIONS)
                .collect();
            if !suggestions.is_empty() {
                println!("\n{}", "Did you mean:".cyan());
                for suggestion in suggestions {
                    println!("  {} {}", "→".cyan(), suggestion);
                }
            }
            Ok(false)
        }
        Lookup::NotFound(NotFound::Poster(missing)) => {
            if json {
                let body = serde_json::json!({ "error": "poster_not_found", "title": missing });
                println!("{}", serde_json::to_string_pretty(&body)?);
                return Ok(false);
            }

            println!(
                "{} {}",
                "No poster available for recommended title:".yellow().bold(),
                missing
            );
            Ok(false)
        }
    }
}

pub fn titles(config: RecommenderConfig, limit: Option<usize>) -> Result<()> {
    let titles = BookRecommender::new(config).service().titles()?;
    let total = titles.len();
    let shown = limit.unwrap_or(total).min(total);

    for title in titles.iter().take(shown) {
        println!("{}", title);
    }
    if shown < total {
        println!(
            "{}",
            format!("... {} more ({} titles)", total - shown, total).dimmed()
        );
    }
    Ok(())
}

pub fn show_config(config: &RecommenderConfig) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
