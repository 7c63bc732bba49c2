use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::{
    FollowRepo, IngredientRepo, MembershipRepo, RecipeRepo, RepoError, RepoResult, TagRepo,
    UserRepo,
};
use crate::ingredients::repo_types::{Ingredient, NewIngredient};
use crate::recipes::shopping_list;
use crate::recipes::repo_types::{
    IngredientAmount, IngredientTotal, Recipe, RecipeChanges, RecipeDraft, RecipeFilter,
    RecipeIngredient, RecipeList, RecipeRow,
};
use crate::tags::repo_types::{NewTag, Tag};
use crate::users::repo_types::{NewUser, Role, User};

const USER_COLUMNS: &str =
    "u.id, u.email, u.username, u.first_name, u.last_name, u.password_hash, u.role, u.created_at";

const RECIPE_COLUMNS: &str = "r.id, r.author_id, r.name, r.text, r.image, r.cooking_time, r.created_at";

// $1 author, $2 tag slugs, $3 is_favorited, $4 is_in_shopping_cart, $5 viewer
const RECIPE_FILTER: &str = r#"
    WHERE ($1::uuid IS NULL OR r.author_id = $1)
      AND (cardinality($2::text[]) = 0 OR EXISTS (
            SELECT 1 FROM recipe_tags rt JOIN tags t ON t.id = rt.tag_id
             WHERE rt.recipe_id = r.id AND t.slug = ANY($2)))
      AND ($3::bool IS NULL OR EXISTS (
            SELECT 1 FROM favorites f
             WHERE f.recipe_id = r.id AND f.user_id = $5::uuid) = $3)
      AND ($4::bool IS NULL OR EXISTS (
            SELECT 1 FROM shopping_cart c
             WHERE c.recipe_id = r.id AND c.user_id = $5::uuid) = $4)
"#;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self::new(pool))
    }

    /// Connects and brings the schema up to date. Both steps must succeed.
    pub async fn open(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let store = Self::connect(database_url, max_connections).await?;
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("run migrations")?;
        Ok(())
    }

    async fn load_relations(
        &self,
        rows: Vec<RecipeRow>,
    ) -> RepoResult<Vec<Recipe>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();

        let tag_links = sqlx::query_as::<_, TagLink>(
            r#"
            SELECT rt.recipe_id, t.id, t.name, t.color, t.slug
              FROM recipe_tags rt
              JOIN tags t ON t.id = rt.tag_id
             WHERE rt.recipe_id = ANY($1)
             ORDER BY t.id
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let lines = sqlx::query_as::<_, IngredientLine>(
            r#"
            SELECT ri.recipe_id, i.id, i.name, i.measurement_unit, ri.amount
              FROM recipe_ingredients ri
              JOIN ingredients i ON i.id = ri.ingredient_id
             WHERE ri.recipe_id = ANY($1)
             ORDER BY ri.id
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut tags: HashMap<i64, Vec<Tag>> = HashMap::new();
        for link in tag_links {
            tags.entry(link.recipe_id).or_default().push(link.tag);
        }
        let mut ingredients: HashMap<i64, Vec<RecipeIngredient>> = HashMap::new();
        for line in lines {
            ingredients.entry(line.recipe_id).or_default().push(line.line);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let id = row.id;
                row.into_recipe(
                    tags.remove(&id).unwrap_or_default(),
                    ingredients.remove(&id).unwrap_or_default(),
                )
            })
            .collect())
    }
}

#[derive(FromRow)]
struct TagLink {
    recipe_id: i64,
    #[sqlx(flatten)]
    tag: Tag,
}

#[derive(FromRow)]
struct IngredientLine {
    recipe_id: i64,
    #[sqlx(flatten)]
    line: RecipeIngredient,
}

/// Escapes LIKE wildcards so user input only ever matches literally.
fn like_prefix(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

fn fk_message(e: RepoError) -> RepoError {
    match e {
        RepoError::MissingReference(msg) if msg.contains("ingredient_id") => {
            RepoError::MissingReference("Unknown ingredient id".into())
        }
        RepoError::MissingReference(msg) if msg.contains("tag_id") => {
            RepoError::MissingReference("Unknown tag id".into())
        }
        other => other,
    }
}

async fn insert_lines_tx(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: i64,
    lines: &[IngredientAmount],
) -> RepoResult<()> {
    let ids: Vec<i64> = lines.iter().map(|l| l.id).collect();
    let amounts: Vec<i32> = lines.iter().map(|l| l.amount).collect();
    sqlx::query(
        r#"
        INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount)
        SELECT $1, t.ingredient_id, t.amount
          FROM UNNEST($2::bigint[], $3::int4[]) WITH ORDINALITY AS t(ingredient_id, amount, ord)
         ORDER BY t.ord
        "#,
    )
    .bind(recipe_id)
    .bind(&ids)
    .bind(&amounts)
    .execute(&mut **tx)
    .await
    .map_err(|e| fk_message(e.into()))?;
    Ok(())
}

async fn insert_tags_tx(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: i64,
    tags: &[i64],
) -> RepoResult<()> {
    sqlx::query(
        r#"
        INSERT INTO recipe_tags (recipe_id, tag_id)
        SELECT $1, UNNEST($2::bigint[])
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(recipe_id)
    .bind(tags)
    .execute(&mut **tx)
    .await
    .map_err(|e| fk_message(e.into()))?;
    Ok(())
}

#[async_trait]
impl UserRepo for PgStore {
    async fn create_user(&self, new: NewUser) -> RepoResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, username, first_name, last_name, password_hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, email, username, first_name, last_name, password_hash, role, created_at
            "#,
        )
        .bind(&new.email)
        .bind(&new.username)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users u WHERE u.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users u WHERE u.email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn list_users(&self, limit: i64, offset: i64) -> RepoResult<(Vec<User>, i64)> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users u ORDER BY u.created_at, u.id LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok((users, total))
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> RepoResult<()> {
        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_role(&self, email: &str, role: Role) -> RepoResult<bool> {
        let res = sqlx::query("UPDATE users SET role = $2 WHERE email = $1")
            .bind(email)
            .bind(role)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

#[async_trait]
impl TagRepo for PgStore {
    async fn list_tags(&self) -> RepoResult<Vec<Tag>> {
        let tags = sqlx::query_as::<_, Tag>("SELECT id, name, color, slug FROM tags ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(tags)
    }

    async fn find_tag(&self, id: i64) -> RepoResult<Option<Tag>> {
        let tag = sqlx::query_as::<_, Tag>("SELECT id, name, color, slug FROM tags WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tag)
    }

    async fn create_tag(&self, new: NewTag) -> RepoResult<Tag> {
        let tag = sqlx::query_as::<_, Tag>(
            r#"
            INSERT INTO tags (name, color, slug)
            VALUES ($1, $2, $3)
            RETURNING id, name, color, slug
            "#,
        )
        .bind(&new.name)
        .bind(&new.color)
        .bind(&new.slug)
        .fetch_one(&self.pool)
        .await?;
        Ok(tag)
    }
}

#[async_trait]
impl IngredientRepo for PgStore {
    async fn list_ingredients(&self, name_prefix: Option<&str>) -> RepoResult<Vec<Ingredient>> {
        let rows = sqlx::query_as::<_, Ingredient>(
            r#"
            SELECT id, name, measurement_unit
              FROM ingredients
             WHERE ($1::text IS NULL OR lower(name) LIKE lower($1))
             ORDER BY id
            "#,
        )
        .bind(name_prefix.map(like_prefix))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_ingredient(&self, id: i64) -> RepoResult<Option<Ingredient>> {
        let row = sqlx::query_as::<_, Ingredient>(
            "SELECT id, name, measurement_unit FROM ingredients WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert_ingredients(&self, rows: &[NewIngredient]) -> RepoResult<u64> {
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        let units: Vec<&str> = rows.iter().map(|r| r.measurement_unit.as_str()).collect();
        let res = sqlx::query(
            r#"
            INSERT INTO ingredients (name, measurement_unit)
            SELECT * FROM UNNEST($1::text[], $2::text[])
            ON CONFLICT (name, measurement_unit) DO NOTHING
            "#,
        )
        .bind(&names)
        .bind(&units)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }
}

#[async_trait]
impl RecipeRepo for PgStore {
    async fn create_recipe(&self, author: Uuid, draft: RecipeDraft) -> RepoResult<i64> {
        let mut tx = self.pool.begin().await?;
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO recipes (author_id, name, text, image, cooking_time)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(author)
        .bind(&draft.name)
        .bind(&draft.text)
        .bind(&draft.image)
        .bind(draft.cooking_time)
        .fetch_one(&mut *tx)
        .await?;

        insert_lines_tx(&mut tx, id, &draft.ingredients).await?;
        insert_tags_tx(&mut tx, id, &draft.tags).await?;
        tx.commit().await?;
        debug!(recipe_id = id, "recipe inserted");
        Ok(id)
    }

    async fn update_recipe(&self, id: i64, changes: RecipeChanges) -> RepoResult<bool> {
        let mut tx = self.pool.begin().await?;
        let res = sqlx::query(
            r#"
            UPDATE recipes
               SET name = COALESCE($2, name),
                   text = COALESCE($3, text),
                   image = COALESCE($4, image),
                   cooking_time = COALESCE($5, cooking_time)
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(changes.name.as_deref())
        .bind(changes.text.as_deref())
        .bind(changes.image.as_deref())
        .bind(changes.cooking_time)
        .execute(&mut *tx)
        .await?;
        if res.rows_affected() == 0 {
            return Ok(false);
        }

        if let Some(lines) = &changes.ingredients {
            sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            insert_lines_tx(&mut tx, id, lines).await?;
        }
        if let Some(tags) = &changes.tags {
            sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            insert_tags_tx(&mut tx, id, tags).await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn delete_recipe(&self, id: i64) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM recipes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn find_recipe(&self, id: i64) -> RepoResult<Option<Recipe>> {
        let row = sqlx::query_as::<_, RecipeRow>(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes r WHERE r.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(self.load_relations(vec![row]).await?.pop())
    }

    async fn list_recipes(
        &self,
        filter: &RecipeFilter,
        limit: i64,
        offset: i64,
    ) -> RepoResult<(Vec<Recipe>, i64)> {
        let rows = sqlx::query_as::<_, RecipeRow>(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes r {RECIPE_FILTER}
             ORDER BY r.created_at DESC, r.id DESC
             LIMIT $6 OFFSET $7"
        ))
        .bind(filter.author)
        .bind(&filter.tags)
        .bind(filter.is_favorited)
        .bind(filter.is_in_shopping_cart)
        .bind(filter.viewer)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM recipes r {RECIPE_FILTER}"))
                .bind(filter.author)
                .bind(&filter.tags)
                .bind(filter.is_favorited)
                .bind(filter.is_in_shopping_cart)
                .bind(filter.viewer)
                .fetch_one(&self.pool)
                .await?;

        Ok((self.load_relations(rows).await?, total))
    }

    async fn recipes_by_author(
        &self,
        author: Uuid,
        limit: Option<i64>,
    ) -> RepoResult<(Vec<Recipe>, i64)> {
        let rows = sqlx::query_as::<_, RecipeRow>(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes r
             WHERE r.author_id = $1
             ORDER BY r.created_at DESC, r.id DESC
             LIMIT $2"
        ))
        .bind(author)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM recipes WHERE author_id = $1")
            .bind(author)
            .fetch_one(&self.pool)
            .await?;
        Ok((self.load_relations(rows).await?, total))
    }
}

#[async_trait]
impl MembershipRepo for PgStore {
    async fn add_to_list(&self, list: RecipeList, user: Uuid, recipe: i64) -> RepoResult<bool> {
        let res = sqlx::query(&format!(
            "INSERT INTO {} (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            list.table()
        ))
        .bind(user)
        .bind(recipe)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            debug!(%user, recipe, list = list.label(), "membership already present");
        }
        Ok(res.rows_affected() > 0)
    }

    async fn remove_from_list(
        &self,
        list: RecipeList,
        user: Uuid,
        recipe: i64,
    ) -> RepoResult<bool> {
        let res = sqlx::query(&format!(
            "DELETE FROM {} WHERE user_id = $1 AND recipe_id = $2",
            list.table()
        ))
        .bind(user)
        .bind(recipe)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn in_list(&self, list: RecipeList, user: Uuid, recipe: i64) -> RepoResult<bool> {
        let exists: bool = sqlx::query_scalar(&format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE user_id = $1 AND recipe_id = $2)",
            list.table()
        ))
        .bind(user)
        .bind(recipe)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn cart_ingredient_totals(&self, user: Uuid) -> RepoResult<Vec<IngredientTotal>> {
        let lines = sqlx::query_as::<_, RecipeIngredient>(
            r#"
            SELECT i.id, i.name, i.measurement_unit, ri.amount
              FROM shopping_cart c
              JOIN recipe_ingredients ri ON ri.recipe_id = c.recipe_id
              JOIN ingredients i ON i.id = ri.ingredient_id
             WHERE c.user_id = $1
             ORDER BY i.name, i.measurement_unit
            "#,
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;
        debug!(%user, lines = lines.len(), "cart lines fetched");
        Ok(shopping_list::aggregate(&lines))
    }
}

#[async_trait]
impl FollowRepo for PgStore {
    async fn follow(&self, user: Uuid, author: Uuid) -> RepoResult<bool> {
        let res = sqlx::query(
            "INSERT INTO follows (user_id, author_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user)
        .bind(author)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn unfollow(&self, user: Uuid, author: Uuid) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM follows WHERE user_id = $1 AND author_id = $2")
            .bind(user)
            .bind(author)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn is_following(&self, user: Uuid, author: Uuid) -> RepoResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM follows WHERE user_id = $1 AND author_id = $2)",
        )
        .bind(user)
        .bind(author)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn list_followed(
        &self,
        user: Uuid,
        limit: i64,
        offset: i64,
    ) -> RepoResult<(Vec<User>, i64)> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS}
               FROM follows f
               JOIN users u ON u.id = f.author_id
              WHERE f.user_id = $1
              ORDER BY f.created_at DESC, u.id
              LIMIT $2 OFFSET $3"
        ))
        .bind(user)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM follows WHERE user_id = $1")
            .bind(user)
            .fetch_one(&self.pool)
            .await?;
        Ok((users, total))
    }
}
