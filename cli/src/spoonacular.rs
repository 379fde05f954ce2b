use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::warn;

use potluck_core::error::Error;
use potluck_core::models::ParsedIngredient;
use potluck_core::spoonacular::{
    ParseIngredientsForm, ParsedIngredientData, TextResponse, to_parsed_ingredients,
};
use potluck_core::upstream::{FoodTrivia, IngredientNormalizer, TriviaKind};

pub const DEFAULT_BASE_URL: &str = "https://api.spoonacular.com";

pub struct SpoonacularClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl SpoonacularClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "potluck/{} (recipe server)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn api_key(&self) -> Result<&str, Error> {
        self.api_key
            .as_deref()
            .ok_or_else(|| Error::Upstream("no Spoonacular API key configured".to_string()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn fetch_text(&self, path: &str) -> Result<String, Error> {
        let key = self.api_key()?;
        let resp = self
            .client
            .get(self.url(path))
            .query(&[("apiKey", key)])
            .send()
            .await
            .map_err(|e| upstream("request failed", &e))?
            .error_for_status()
            .map_err(|e| upstream("bad status", &e))?;

        let data: TextResponse = resp
            .json()
            .await
            .map_err(|e| upstream("unreadable response", &e))?;
        Ok(data.text)
    }
}

fn upstream(what: &str, err: &reqwest::Error) -> Error {
    warn!(error = %err, "spoonacular {what}");
    if err.is_timeout() {
        Error::Upstream("Spoonacular request timed out".to_string())
    } else {
        Error::Upstream(format!("Spoonacular {what}"))
    }
}

#[async_trait]
impl IngredientNormalizer for SpoonacularClient {
    async fn normalize(
        &self,
        lines: &[String],
        servings: u32,
    ) -> potluck_core::error::Result<Vec<ParsedIngredient>> {
        let key = self.api_key()?;
        let resp = self
            .client
            .post(self.url("recipes/parseIngredients"))
            .query(&[("apiKey", key)])
            .form(&ParseIngredientsForm::new(lines, servings))
            .send()
            .await
            .map_err(|e| upstream("request failed", &e))?
            .error_for_status()
            .map_err(|e| upstream("bad status", &e))?;

        let items: Vec<ParsedIngredientData> = resp
            .json()
            .await
            .map_err(|e| upstream("unreadable response", &e))?;
        Ok(to_parsed_ingredients(items))
    }
}

#[async_trait]
impl FoodTrivia for SpoonacularClient {
    async fn random_text(&self, kind: TriviaKind) -> potluck_core::error::Result<String> {
        let path = match kind {
            TriviaKind::Fact => "food/trivia/random",
            TriviaKind::Joke => "food/jokes/random",
        };
        self.fetch_text(path).await
    }
}
