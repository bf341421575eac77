use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use tracing_subscriber::EnvFilter;

use kitchen_chef::app_state::{AppState, SyncOutcome, UserSession};
use kitchen_chef::config::AppConfig;
use kitchen_chef::mealdb::RecipeApi;
use kitchen_chef::offline_queue::DrainOutcome;
use kitchen_chef::ratings::{submit_review, PgReviewStore, Review, ReviewStore, DEFAULT_RATING};
use kitchen_chef::recipe_model::Recipe;
use kitchen_chef::remote::{MemoryFavoriteStore, PgFavoriteStore, RemoteFavoriteStore};
use kitchen_chef::scoring::{annotate, rank, Preference, RankedRecipe};
use kitchen_chef::settings::SettingsPatch;
use kitchen_chef::storage::{KeyValueStore, SqliteKeyValueStore};

#[derive(Parser)]
#[command(name = "kitchen-chef", about = "Find recipes and manage favorites")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Treat the network as unavailable; favorite changes are queued
    #[arg(long, global = true)]
    offline: bool,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Search recipes by name
    Search {
        query: String,
        #[command(flatten)]
        ranking: RankingArgs,
    },

    /// Recipes that use every given ingredient
    ByIngredients {
        #[arg(required = true)]
        ingredients: Vec<String>,
        #[command(flatten)]
        ranking: RankingArgs,
    },

    /// Recipes of one cuisine
    Cuisine {
        name: String,
        #[command(flatten)]
        ranking: RankingArgs,
    },

    /// Toggle a recipe in the favorites list
    Favorite { recipe_id: String },

    /// List favorite recipe ids
    Favorites,

    /// Replay favorite changes made while offline
    Sync,

    /// Change push notification settings
    Settings {
        #[arg(long)]
        new_recipes: Option<bool>,
        #[arg(long)]
        cooking_timers: Option<bool>,
        #[arg(long)]
        favorite_updates: Option<bool>,
    },

    /// Clear favorites, settings and queued changes
    SignOut,

    /// Rate and review a recipe
    Review {
        recipe_id: String,
        comment: String,
        /// Stars, 1 to 5
        #[arg(long, default_value_t = DEFAULT_RATING)]
        rating: u8,
    },

    /// Average rating and review count of a recipe
    Stats { recipe_id: String },
}

#[derive(clap::Args)]
struct RankingArgs {
    /// Ingredients to rank results by
    #[arg(long = "ingredient")]
    ingredients: Vec<String>,

    /// Preferred cuisine
    #[arg(long)]
    prefer_cuisine: Option<String>,

    /// Only show vegetarian recipes
    #[arg(long)]
    vegetarian: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = AppConfig::from_env()?;

    let store: Arc<dyn KeyValueStore> = Arc::new(
        SqliteKeyValueStore::open(&config.local_db_path).await?,
    );
    let remote: Arc<dyn RemoteFavoriteStore> = match &config.remote_database_url {
        Some(url) => Arc::new(PgFavoriteStore::connect(url).await?),
        // Never written to: without a remote the state stays offline
        None => Arc::new(MemoryFavoriteStore::new()),
    };

    let state = AppState::load(store, remote).await?;
    state.set_user(config.user_id.as_deref().map(UserSession::new));

    if !config.has_remote() {
        info!("No remote favorites store configured, favorite changes stay queued");
    }

    // Coming online drains anything queued by earlier runs
    if let Err(e) = state.set_connectivity(config.starts_online(cli.offline)).await {
        warn!("Offline actions not synced: {}", e);
    }

    match cli.command {
        Command::Search { query, ranking } => {
            let api = RecipeApi::new(&config.api)?;
            print_recipes(api.search(&query).await, &ranking);
        }
        Command::ByIngredients {
            ingredients,
            mut ranking,
        } => {
            let api = RecipeApi::new(&config.api)?;
            let recipes = api.search_by_ingredients(&ingredients).await;
            if ranking.ingredients.is_empty() {
                ranking.ingredients = ingredients;
            }
            print_recipes(recipes, &ranking);
        }
        Command::Cuisine { name, ranking } => {
            let api = RecipeApi::new(&config.api)?;
            print_recipes(api.filter_by_cuisine(&name).await, &ranking);
        }
        Command::Favorite { recipe_id } => {
            let favorited = state.toggle_favorite(&recipe_id).await?;
            let verb = if favorited { "Added" } else { "Removed" };
            let queued = if state.is_offline() { " (queued until online)" } else { "" };
            println!("{verb} {recipe_id}{queued}");
        }
        Command::Favorites => {
            let favorites = state.favorites();
            if favorites.is_empty() {
                println!("No favorites yet");
            }
            for id in favorites.ids() {
                println!("{id}");
            }
            let pending = state.queue().len().await?;
            if pending > 0 {
                println!("{pending} change(s) waiting to sync");
            }
        }
        Command::Sync => {
            if cli.offline {
                anyhow::bail!("cannot sync while offline");
            }
            if !config.has_remote() {
                anyhow::bail!("no remote favorites store configured, set DATABASE_URL to sync");
            }
            match state.sync_offline_actions().await? {
                SyncOutcome::NotSignedIn => println!("Sign in to sync favorites"),
                SyncOutcome::Drained(DrainOutcome::Completed { entries, applied }) => {
                    println!("Synced {entries} change(s) as {applied} update(s)")
                }
                SyncOutcome::Drained(_) => println!("Nothing to sync"),
            }
        }
        Command::Settings {
            new_recipes,
            cooking_timers,
            favorite_updates,
        } => {
            let patch = SettingsPatch {
                new_recipes,
                cooking_timers,
                favorite_updates,
            };
            let settings = state
                .update_push_settings(patch)
                .await
                .context("Failed to update notification settings")?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        Command::SignOut => {
            state.sign_out().await?;
            println!("Signed out");
        }
        Command::Review {
            recipe_id,
            comment,
            rating,
        } => {
            let Some(user) = state.user() else {
                anyhow::bail!("sign in to review recipes");
            };
            let review = Review::new(&recipe_id, &user.id, rating, &comment)?;
            let reviews = connect_reviews(&config).await?;
            let stats = submit_review(&reviews, &review).await?;
            println!(
                "Thanks! {recipe_id} is rated {:.1} from {} review(s)",
                stats.average_rating, stats.total_reviews
            );
        }
        Command::Stats { recipe_id } => {
            let reviews = connect_reviews(&config).await?;
            match reviews.stats(&recipe_id).await? {
                Some(stats) => println!(
                    "{recipe_id}: {:.1} stars from {} review(s), updated {}",
                    stats.average_rating,
                    stats.total_reviews,
                    stats.last_updated.to_rfc3339()
                ),
                None => println!("{recipe_id} has no reviews yet"),
            }
        }
    }

    Ok(())
}

async fn connect_reviews(config: &AppConfig) -> Result<PgReviewStore> {
    let Some(url) = &config.remote_database_url else {
        anyhow::bail!("reviews need a remote database, set DATABASE_URL");
    };
    PgReviewStore::connect(url).await
}

fn print_recipes(recipes: Vec<Recipe>, args: &RankingArgs) {
    let preferences: Vec<Preference> = args
        .prefer_cuisine
        .as_deref()
        .and_then(|cuisine| Preference::from_pair("cuisine", cuisine))
        .into_iter()
        .collect();

    let ranked = rank(recipes, &args.ingredients, &preferences);
    let mut shown = 0;

    for RankedRecipe {
        recipe,
        match_score,
        preference_score,
    } in ranked
    {
        let annotated = annotate(recipe);
        if args.vegetarian && !annotated.is_vegetarian {
            continue;
        }
        shown += 1;
        println!(
            "{:<8} {:<40} match {:.2} pref {:.1}  {} kcal  {}{}",
            annotated.recipe.id,
            annotated.recipe.title,
            match_score,
            preference_score,
            annotated.estimated_calories,
            annotated.cooking_time,
            if annotated.is_vegetarian { "  [veg]" } else { "" },
        );
    }

    if shown == 0 {
        println!("No recipes found");
    }
}
