use potluck_backend::Backend;
use potluck_common::PotluckError;
use potluck_config::RecipesConfig;
use potluck_recipes::{Recipe, RecipeCatalog};

use crate::cli::RecipesCommand;

fn summary_line(recipe: &Recipe) -> String {
    match recipe.prep_minutes {
        Some(minutes) => format!("{}  {} ({minutes} min)", recipe.id, recipe.title),
        None => format!("{}  {}", recipe.id, recipe.title),
    }
}

fn details(recipe: &Recipe) -> String {
    let mut out = format!("{}\n", recipe.title);
    if let Some(description) = &recipe.description {
        out.push_str(&format!("\n{description}\n"));
    }
    if !recipe.ingredients.is_empty() {
        out.push_str("\nIngredients:\n");
        for item in &recipe.ingredients {
            out.push_str(&format!("  - {item}\n"));
        }
    }
    if !recipe.steps.is_empty() {
        out.push_str("\nSteps:\n");
        for (i, step) in recipe.steps.iter().enumerate() {
            out.push_str(&format!("  {}. {step}\n", i + 1));
        }
    }
    if let Some(url) = &recipe.image_url {
        out.push_str(&format!("\nImage: {url}\n"));
    }
    out
}

pub async fn run(
    backend: &Backend,
    config: &RecipesConfig,
    command: RecipesCommand,
) -> Result<(), PotluckError> {
    let catalog = RecipeCatalog::new(backend, config);
    match command {
        RecipesCommand::List => {
            let recipes = catalog.list().await?;
            if recipes.is_empty() {
                println!("No recipes yet.");
            }
            for recipe in &recipes {
                println!("{}", summary_line(recipe));
            }
        }
        RecipesCommand::Show { id } => {
            let recipe = catalog.get(&id).await?;
            print!("{}", details(&recipe));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn recipe() -> Recipe {
        Recipe {
            id: "r1".into(),
            title: "Flatbread".into(),
            description: None,
            ingredients: vec!["flour".into(), "water".into()],
            steps: vec!["Mix".into(), "Bake".into()],
            prep_minutes: Some(25),
            image_url: None,
            created_by: "u1".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn summary_includes_prep_time() {
        assert_eq!(summary_line(&recipe()), "r1  Flatbread (25 min)");
    }

    #[test]
    fn details_numbers_steps() {
        let text = details(&recipe());
        assert!(text.starts_with("Flatbread\n"));
        assert!(text.contains("  - flour\n"));
        assert!(text.contains("  2. Bake\n"));
        assert!(!text.contains("Image:"));
    }
}
