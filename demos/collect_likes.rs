//! Collect likes for one profile and print the top voters
//!
//! ```text
//! cargo run --example collect_likes -- https://dtf.ru/u/12345
//! ```
//!
//! Credentials are optional and read from the environment:
//! - `OSNOVA_REFRESH_TOKEN` switches to the reactions endpoint (needs the token relay)
//! - `OSNOVA_COOKIE` switches to the cookie likers endpoint
//! - `OSNOVA_LIKES_CONFIG` points at a JSON config file

use osnova_likes::utils::{MAX_USERS_TO_SHOW, RankBy, format_time, rank_users};
use osnova_likes::{Config, Event, LikesCollector, LikesMode, collect_with_shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    let Some(link) = std::env::args().nth(1) else {
        eprintln!("usage: collect_likes <profile link>");
        std::process::exit(2);
    };

    let config = match std::env::var("OSNOVA_LIKES_CONFIG") {
        Ok(path) => Config::from_json_file(path)?,
        Err(_) => Config::default(),
    };

    let mode = if let Ok(refresh_token) = std::env::var("OSNOVA_REFRESH_TOKEN") {
        LikesMode::Token { refresh_token }
    } else if let Ok(key) = std::env::var("OSNOVA_COOKIE") {
        LikesMode::Cookie { key }
    } else {
        LikesMode::Anonymous
    };

    let collector = LikesCollector::new(config)?;

    let mut events = collector.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::ProfileLoaded { profile } => {
                    println!(
                        "{} ({:+}), entries: {}, comments: {}",
                        profile.name, profile.rating, profile.entries, profile.comments
                    );
                }
                Event::ProfileUnavailable { error } => {
                    println!("Profile unavailable ({error}), continuing without it");
                }
                Event::CommentsLoaded {
                    loaded,
                    total,
                    remaining_secs,
                } => match (total, remaining_secs) {
                    (Some(total), Some(secs)) => {
                        println!("Comments: {loaded}/{total}, ~{} left", format_time(secs))
                    }
                    _ => println!("Comments: {loaded}, total unknown"),
                },
                Event::LikesProgress {
                    progress,
                    remaining_secs,
                } => {
                    println!(
                        "Reactions: {}/{} comments, +{} -{}, ~{} left",
                        progress.counted,
                        progress.count,
                        progress.likes,
                        progress.dislikes,
                        format_time(remaining_secs)
                    );
                }
                Event::Completed { users, failed } => {
                    println!("Done: {} users, {} failed comments", users.len(), failed.len());
                }
            }
        }
    });

    let report = collect_with_shutdown(&collector, &link, mode).await?;
    let site = report.target.site;

    println!("\nTop likers:");
    for (i, user) in rank_users(&report.users, RankBy::Likes, MAX_USERS_TO_SHOW)
        .into_iter()
        .take(10)
        .enumerate()
    {
        println!("{:>3}. {} https://{site}/u/{} +{}", i + 1, user.name, user.id, user.likes);
    }

    println!("\nTop dislikers:");
    for (i, user) in rank_users(&report.users, RankBy::Dislikes, MAX_USERS_TO_SHOW)
        .into_iter()
        .take(10)
        .enumerate()
    {
        println!("{:>3}. {} https://{site}/u/{} -{}", i + 1, user.name, user.id, user.dislikes);
    }

    Ok(())
}
