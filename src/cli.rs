use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::storage::photos::USER_PHOTOS_BUCKET;
use crate::storage::FavoriteKind;

#[derive(Parser, Debug)]
#[command(author, version, about = "Recipe, nutrition and taste assistant", long_about = None)]
pub struct Cli {
    /// Key-value store file (overrides STORE_PATH)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse an ingredient list and report validation problems
    Parse(IngredientInput),
    /// Ask the nutrition webhook for totals of an ingredient list
    Nutrition {
        #[command(flatten)]
        input: IngredientInput,
        #[arg(short, long)]
        servings: Option<u32>,
        #[arg(long)]
        user: Option<String>,
    },
    /// Generate a recipe from ingredient names
    Recipe {
        /// Ingredient names, e.g. 猪肉 白菜
        #[arg(required = true)]
        ingredients: Vec<String>,
        #[arg(short, long)]
        cuisine: Option<String>,
        #[arg(short, long)]
        difficulty: Option<String>,
        #[arg(long)]
        user: Option<String>,
        /// Scan the candidate webhooks instead of using the configured one
        #[arg(long)]
        probe: bool,
    },
    /// Report which candidate recipe webhook answers
    Probe,
    /// Send one chat message to the assistant
    Chat {
        message: String,
    },
    /// Recommendations from saved preferences
    Recommend,
    /// Show saved preferences
    Preferences,
    #[command(subcommand)]
    Photos(PhotoCommand),
    #[command(subcommand)]
    Favorites(FavoriteCommand),
}

#[derive(Args, Debug)]
pub struct IngredientInput {
    /// File with one ingredient per line; stdin when omitted
    #[arg(short, long)]
    pub file: Option<PathBuf>,
    /// Inline lines, e.g. "猪肉 200g"
    pub lines: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum PhotoCommand {
    Upload {
        path: PathBuf,
        #[arg(long, default_value = "anonymous")]
        user: String,
    },
    List {
        #[arg(long, default_value = "anonymous")]
        user: String,
    },
    Remove {
        id: String,
        /// Stored object name on the remote tier; the object is kept when omitted
        #[arg(long, default_value = "")]
        file_name: String,
        #[arg(long, default_value = USER_PHOTOS_BUCKET)]
        bucket: String,
    },
    /// Mark a photo as the user's avatar
    Avatar {
        id: String,
        #[arg(long, default_value = "anonymous")]
        user: String,
    },
    ShowAvatar {
        #[arg(long, default_value = "anonymous")]
        user: String,
    },
    /// Check that the remote photo table and bucket are reachable
    Check,
}

#[derive(Args, Debug)]
pub struct FavoriteTarget {
    pub id: String,
    #[arg(short, long, default_value = "dish")]
    pub kind: FavoriteKind,
}

#[derive(Subcommand, Debug)]
pub enum FavoriteCommand {
    Add {
        #[command(flatten)]
        target: FavoriteTarget,
        #[arg(short, long)]
        name: String,
        #[arg(long, default_value = "")]
        image: String,
    },
    Remove {
        #[command(flatten)]
        target: FavoriteTarget,
    },
    Toggle {
        #[command(flatten)]
        target: FavoriteTarget,
        #[arg(short, long)]
        name: String,
        #[arg(long, default_value = "")]
        image: String,
    },
    List,
    Clear,
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
