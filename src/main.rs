use anyhow::{bail, Context, Result};
use std::io::Read;
use std::sync::Arc;

use recipe_assist::api_connection::{
    ChatProvider, EndpointResolver, HttpTransport, JsonTransport, Resolution,
};
use recipe_assist::cli::{parse_args, Command, FavoriteCommand, IngredientInput, PhotoCommand};
use recipe_assist::config::AppConfig;
use recipe_assist::ingredient_parser;
use recipe_assist::logging::init_tracing;
use recipe_assist::nutrition_calculator::NutritionClient;
use recipe_assist::preferences::{AIResponse, AssistantSession};
use recipe_assist::recipe_generator::{
    RecipeClient, RecipeGenerationRequest, RecipeGenerationResponse, RecipeWebhookPayload,
};
use recipe_assist::storage::{
    FavoriteItem, FavoritesStore, JsonFileStore, KeyValueStore, LocalFirstStore, PhotoFile,
    SupabaseRemote, UserPhoto,
};

async fn read_ingredients(input: &IngredientInput) -> Result<String> {
    if !input.lines.is_empty() {
        return Ok(input.lines.join("\n"));
    }
    if let Some(path) = &input.file {
        return tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read ingredient file '{}'", path.display()));
    }
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("Failed to read ingredients from stdin")?;
    Ok(text)
}

fn print_ai_response(response: &AIResponse) {
    println!("{}", response.message);
    if !response.recommendations.is_empty() {
        println!("推荐: {}", response.recommendations.join("、"));
    }
    println!("置信度: {:.2}", response.confidence);
}

fn print_photo(photo: &UserPhoto) {
    println!(
        "{}  {}  {} bytes  {}{}",
        photo.id,
        photo.file_name,
        photo.file_size,
        photo.upload_date.to_rfc3339(),
        if photo.is_avatar { "  [avatar]" } else { "" }
    );
}

fn print_recipe_response(response: &RecipeGenerationResponse) -> Result<()> {
    match (&response.recipe, &response.error) {
        (Some(recipe), _) if response.success => {
            println!("{}", serde_json::to_string_pretty(recipe)?);
            Ok(())
        }
        (_, Some(error)) => bail!("Recipe generation failed: {}", error),
        _ => bail!("Recipe generation failed"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let cli = parse_args();
    let config = AppConfig::from_env().context("Invalid configuration")?;
    let store_path = cli.store.clone().unwrap_or_else(|| config.store_path.clone());

    let transport: Arc<dyn JsonTransport> = Arc::new(HttpTransport::new()?);
    let open_store = || -> Result<Arc<dyn KeyValueStore>> {
        let store = JsonFileStore::open(&store_path)
            .with_context(|| format!("Failed to open store '{}'", store_path.display()))?;
        Ok(Arc::new(store))
    };
    let chat_provider = || {
        ChatProvider::new(transport.clone(), config.ai_api_key.clone())
            .with_base_url(config.ai_api_url.clone())
            .with_model(config.ai_model.clone())
            .with_timeout(config.ai_timeout)
    };

    match cli.command {
        Command::Parse(input) => {
            let text = read_ingredients(&input).await?;
            let items = ingredient_parser::parse(&text);
            for item in &items {
                println!("{}\t{}\t{}", item.name, item.amount, item.unit);
            }
            let report = ingredient_parser::validate_with_limit(&items, config.max_ingredient_amount);
            if !report.is_valid {
                for error in &report.errors {
                    eprintln!("{}", error);
                }
                bail!("Ingredient list is invalid");
            }
        }
        Command::Nutrition { input, servings, user } => {
            let text = read_ingredients(&input).await?;
            let client = NutritionClient::new(transport.clone())
                .with_endpoint(config.nutrition_webhook_url.clone())
                .with_timeout(config.request_timeout)
                .with_max_amount(config.max_ingredient_amount);
            match client.calculate_from_text(&text, servings, user).await {
                Ok(response) if response.success => {
                    println!("{}", serde_json::to_string_pretty(&response)?);
                }
                Ok(response) => bail!(
                    "Nutrition calculation failed: {}",
                    response.error.unwrap_or_default()
                ),
                Err(report) => {
                    for error in &report.errors {
                        eprintln!("{}", error);
                    }
                    bail!("Ingredient list is invalid");
                }
            }
        }
        Command::Recipe {
            ingredients,
            cuisine,
            difficulty,
            user,
            probe,
        } => {
            let request = RecipeGenerationRequest {
                ingredients,
                cuisine,
                difficulty,
                user_id: user,
            };
            let client = RecipeClient::new(transport.clone())
                .with_endpoint(config.recipe_webhook_url.clone())
                .with_timeout(config.request_timeout);
            if probe {
                let (url, response) = client
                    .generate_with_probe(&request, &config.recipe_webhook_candidates)
                    .await;
                if let Some(url) = url {
                    println!("Answered by {}", url);
                }
                print_recipe_response(&response)?;
            } else {
                print_recipe_response(&client.generate(&request).await)?;
            }
        }
        Command::Probe => {
            let sample = RecipeGenerationRequest {
                ingredients: vec!["鸡蛋".to_string(), "番茄".to_string()],
                ..Default::default()
            };
            let payload = serde_json::to_value(RecipeWebhookPayload::from_request(&sample))?;
            let resolution = EndpointResolver::new(transport.as_ref())
                .with_attempt_timeout(config.request_timeout)
                .resolve(&config.recipe_webhook_candidates, &payload)
                .await;
            match resolution {
                Resolution::Resolved { url, .. } => println!("OK  {}", url),
                Resolution::Exhausted { failures } => {
                    for failure in &failures {
                        println!("ERR {}  {}", failure.url, failure.error);
                    }
                    bail!("No recipe webhook answered");
                }
            }
        }
        Command::Chat { message } => {
            let mut session = AssistantSession::restore(chat_provider(), open_store()?);
            let response = session.send_message(&message).await;
            print_ai_response(&response);
        }
        Command::Recommend => {
            let session = AssistantSession::restore(chat_provider(), open_store()?);
            print_ai_response(&session.smart_recommendations().await);
        }
        Command::Preferences => {
            let session = AssistantSession::restore(chat_provider(), open_store()?);
            println!("{}", serde_json::to_string_pretty(session.preferences())?);
        }
        Command::Photos(command) => {
            let mut photos =
                LocalFirstStore::new(open_store()?).with_max_photo_bytes(config.max_photo_bytes);
            if let Some(supabase) = &config.supabase {
                photos = photos.with_remote(Arc::new(SupabaseRemote::new(
                    supabase.url.clone(),
                    supabase.key.clone(),
                )));
            }
            match command {
                PhotoCommand::Upload { path, user } => {
                    let file = PhotoFile::from_path(&path)
                        .await
                        .with_context(|| format!("Failed to read '{}'", path.display()))?;
                    print_photo(&photos.upload(&file, &user).await?);
                }
                PhotoCommand::List { user } => {
                    for photo in photos.list(&user).await {
                        print_photo(&photo);
                    }
                }
                PhotoCommand::Remove {
                    id,
                    file_name,
                    bucket,
                } => photos.remove(&id, &bucket, &file_name).await?,
                PhotoCommand::Avatar { id, user } => photos.set_avatar(&id, &user).await?,
                PhotoCommand::ShowAvatar { user } => match photos.avatar(&user).await {
                    Some(photo) => print_photo(&photo),
                    None => println!("No avatar for {}", user),
                },
                PhotoCommand::Check => {
                    let health = photos.check_remote().await?;
                    for (service, outcome) in [("database", &health.database), ("storage", &health.storage)] {
                        match outcome {
                            Ok(()) => println!("OK  {}", service),
                            Err(e) => println!("ERR {}  {}", service, e),
                        }
                    }
                    if !health.is_healthy() {
                        bail!("Remote tier check failed");
                    }
                }
            }
        }
        Command::Favorites(command) => {
            let favorites = FavoritesStore::new(open_store()?);
            match command {
                FavoriteCommand::Add {
                    target,
                    name,
                    image,
                } => {
                    let added = favorites.add(FavoriteItem::new(target.id, target.kind, name, image))?;
                    println!("{}", if added { "added" } else { "already a favorite" });
                }
                FavoriteCommand::Remove { target } => {
                    let removed = favorites.remove(&target.id, target.kind)?;
                    println!("{}", if removed { "removed" } else { "not a favorite" });
                }
                FavoriteCommand::Toggle {
                    target,
                    name,
                    image,
                } => {
                    let now = favorites.toggle(FavoriteItem::new(target.id, target.kind, name, image))?;
                    println!("{}", if now { "added" } else { "removed" });
                }
                FavoriteCommand::List => {
                    for item in favorites.list()? {
                        println!("{}\t{}\t{}\t{}", item.kind, item.id, item.name, item.added_at.to_rfc3339());
                    }
                }
                FavoriteCommand::Clear => favorites.clear()?,
            }
        }
    }

    Ok(())
}
