//! In-process store with the same constraints as the Postgres schema. Backs
//! router tests so they run without a database.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::{
    FollowRepo, IngredientRepo, MembershipRepo, RecipeRepo, RepoError, RepoResult, TagRepo,
    UserRepo,
};
use crate::ingredients::repo_types::{Ingredient, NewIngredient};
use crate::recipes::repo_types::{
    IngredientAmount, IngredientTotal, Recipe, RecipeChanges, RecipeDraft, RecipeFilter,
    RecipeIngredient, RecipeList,
};
use crate::recipes::shopping_list;
use crate::tags::repo_types::{NewTag, Tag};
use crate::users::repo_types::{NewUser, Role, User};

#[derive(Default)]
struct Data {
    users: Vec<User>,
    tags: Vec<Tag>,
    ingredients: Vec<Ingredient>,
    recipes: Vec<StoredRecipe>,
    memberships: HashMap<RecipeList, BTreeSet<(Uuid, i64)>>,
    follows: Vec<(Uuid, Uuid)>,
    next_id: i64,
}

#[derive(Clone)]
struct StoredRecipe {
    id: i64,
    author_id: Uuid,
    name: String,
    text: String,
    image: String,
    cooking_time: i32,
    created_at: OffsetDateTime,
    tags: Vec<i64>,
    lines: Vec<IngredientAmount>,
}

impl Data {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn check_refs(&self, tags: &[i64], lines: &[IngredientAmount]) -> RepoResult<()> {
        if lines
            .iter()
            .any(|l| !self.ingredients.iter().any(|i| i.id == l.id))
        {
            return Err(RepoError::MissingReference("Unknown ingredient id".into()));
        }
        if tags.iter().any(|t| !self.tags.iter().any(|tag| tag.id == *t)) {
            return Err(RepoError::MissingReference("Unknown tag id".into()));
        }
        let mut seen = HashSet::new();
        if !lines.iter().all(|l| seen.insert(l.id)) {
            return Err(RepoError::Conflict(
                "duplicate value violates unique_ingredient_recipe".into(),
            ));
        }
        if lines.iter().any(|l| l.amount <= 0) {
            return Err(RepoError::Invalid("value rejected by recipe_ingredients_amount_check".into()));
        }
        Ok(())
    }

    fn hydrate(&self, stored: &StoredRecipe) -> Recipe {
        let mut tags: Vec<Tag> = self
            .tags
            .iter()
            .filter(|t| stored.tags.contains(&t.id))
            .cloned()
            .collect();
        tags.sort_by_key(|t| t.id);
        let ingredients = stored
            .lines
            .iter()
            .filter_map(|l| {
                self.ingredients
                    .iter()
                    .find(|i| i.id == l.id)
                    .map(|i| RecipeIngredient {
                        id: i.id,
                        name: i.name.clone(),
                        measurement_unit: i.measurement_unit.clone(),
                        amount: l.amount,
                    })
            })
            .collect();
        Recipe {
            id: stored.id,
            author_id: stored.author_id,
            name: stored.name.clone(),
            text: stored.text.clone(),
            image: stored.image.clone(),
            cooking_time: stored.cooking_time,
            created_at: stored.created_at,
            tags,
            ingredients,
        }
    }

    fn in_list(&self, list: RecipeList, user: Option<Uuid>, recipe: i64) -> bool {
        match user {
            Some(user) => self
                .memberships
                .get(&list)
                .is_some_and(|set| set.contains(&(user, recipe))),
            None => false,
        }
    }

    /// Newest first; ties broken by id like the SQL ordering.
    fn recipes_newest_first(&self) -> Vec<&StoredRecipe> {
        let mut all: Vec<&StoredRecipe> = self.recipes.iter().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        all
    }
}

#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<Data>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Data> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn page<T: Clone>(items: &[T], limit: i64, offset: i64) -> Vec<T> {
    items
        .iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .cloned()
        .collect()
}

#[async_trait]
impl UserRepo for MemoryStore {
    async fn create_user(&self, new: NewUser) -> RepoResult<User> {
        let mut data = self.lock();
        if data.users.iter().any(|u| u.email == new.email) {
            return Err(RepoError::Conflict("A user with this email already exists".into()));
        }
        if data.users.iter().any(|u| u.username == new.username) {
            return Err(RepoError::Conflict("A user with this username already exists".into()));
        }
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            username: new.username,
            first_name: new.first_name,
            last_name: new.last_name,
            password_hash: new.password_hash,
            role: Role::User,
            created_at: OffsetDateTime::now_utc(),
        };
        data.users.push(user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        Ok(self.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        Ok(self.lock().users.iter().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self, limit: i64, offset: i64) -> RepoResult<(Vec<User>, i64)> {
        let data = self.lock();
        Ok((page(&data.users, limit, offset), data.users.len() as i64))
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> RepoResult<()> {
        if let Some(u) = self.lock().users.iter_mut().find(|u| u.id == id) {
            u.password_hash = password_hash.to_string();
        }
        Ok(())
    }

    async fn set_role(&self, email: &str, role: Role) -> RepoResult<bool> {
        match self.lock().users.iter_mut().find(|u| u.email == email) {
            Some(u) => {
                u.role = role;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl TagRepo for MemoryStore {
    async fn list_tags(&self) -> RepoResult<Vec<Tag>> {
        Ok(self.lock().tags.clone())
    }

    async fn find_tag(&self, id: i64) -> RepoResult<Option<Tag>> {
        Ok(self.lock().tags.iter().find(|t| t.id == id).cloned())
    }

    async fn create_tag(&self, new: NewTag) -> RepoResult<Tag> {
        let mut data = self.lock();
        if data.tags.iter().any(|t| t.slug == new.slug) {
            return Err(RepoError::Conflict("A tag with this slug already exists".into()));
        }
        if data.tags.iter().any(|t| t.color == new.color) {
            return Err(RepoError::Conflict("A tag with this color already exists".into()));
        }
        let tag = Tag {
            id: data.next_id(),
            name: new.name,
            color: new.color,
            slug: new.slug,
        };
        data.tags.push(tag.clone());
        Ok(tag)
    }
}

#[async_trait]
impl IngredientRepo for MemoryStore {
    async fn list_ingredients(&self, name_prefix: Option<&str>) -> RepoResult<Vec<Ingredient>> {
        let prefix = name_prefix.map(str::to_lowercase);
        Ok(self
            .lock()
            .ingredients
            .iter()
            .filter(|i| match &prefix {
                Some(p) => i.name.to_lowercase().starts_with(p.as_str()),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn find_ingredient(&self, id: i64) -> RepoResult<Option<Ingredient>> {
        Ok(self.lock().ingredients.iter().find(|i| i.id == id).cloned())
    }

    async fn insert_ingredients(&self, rows: &[NewIngredient]) -> RepoResult<u64> {
        let mut data = self.lock();
        let mut inserted = 0;
        for row in rows {
            let exists = data
                .ingredients
                .iter()
                .any(|i| i.name == row.name && i.measurement_unit == row.measurement_unit);
            if exists {
                continue;
            }
            let id = data.next_id();
            data.ingredients.push(Ingredient {
                id,
                name: row.name.clone(),
                measurement_unit: row.measurement_unit.clone(),
            });
            inserted += 1;
        }
        Ok(inserted)
    }
}

#[async_trait]
impl RecipeRepo for MemoryStore {
    async fn create_recipe(&self, author: Uuid, draft: RecipeDraft) -> RepoResult<i64> {
        let mut data = self.lock();
        if !data.users.iter().any(|u| u.id == author) {
            return Err(RepoError::MissingReference("Unknown author".into()));
        }
        if draft.cooking_time <= 0 {
            return Err(RepoError::Invalid("value rejected by recipes_cooking_time_check".into()));
        }
        data.check_refs(&draft.tags, &draft.ingredients)?;

        let id = data.next_id();
        // Monotonic timestamps keep "newest first" stable within one test.
        let created_at = OffsetDateTime::now_utc() + Duration::microseconds(id);
        let mut tags = draft.tags;
        tags.sort_unstable();
        tags.dedup();
        data.recipes.push(StoredRecipe {
            id,
            author_id: author,
            name: draft.name,
            text: draft.text,
            image: draft.image,
            cooking_time: draft.cooking_time,
            created_at,
            tags,
            lines: draft.ingredients,
        });
        Ok(id)
    }

    async fn update_recipe(&self, id: i64, changes: RecipeChanges) -> RepoResult<bool> {
        let mut data = self.lock();
        let Some(pos) = data.recipes.iter().position(|r| r.id == id) else {
            return Ok(false);
        };
        // Validate everything before mutating so a failure leaves no partial edit.
        let tags = changes.tags.clone().unwrap_or_else(|| data.recipes[pos].tags.clone());
        let lines = changes
            .ingredients
            .clone()
            .unwrap_or_else(|| data.recipes[pos].lines.clone());
        data.check_refs(&tags, &lines)?;
        if changes.cooking_time.is_some_and(|t| t <= 0) {
            return Err(RepoError::Invalid("value rejected by recipes_cooking_time_check".into()));
        }

        let recipe = &mut data.recipes[pos];
        if let Some(name) = changes.name {
            recipe.name = name;
        }
        if let Some(text) = changes.text {
            recipe.text = text;
        }
        if let Some(image) = changes.image {
            recipe.image = image;
        }
        if let Some(t) = changes.cooking_time {
            recipe.cooking_time = t;
        }
        recipe.tags = tags;
        recipe.tags.sort_unstable();
        recipe.tags.dedup();
        recipe.lines = lines;
        Ok(true)
    }

    async fn delete_recipe(&self, id: i64) -> RepoResult<bool> {
        let mut data = self.lock();
        let before = data.recipes.len();
        data.recipes.retain(|r| r.id != id);
        if data.recipes.len() == before {
            return Ok(false);
        }
        for set in data.memberships.values_mut() {
            set.retain(|(_, recipe)| *recipe != id);
        }
        Ok(true)
    }

    async fn find_recipe(&self, id: i64) -> RepoResult<Option<Recipe>> {
        let data = self.lock();
        Ok(data
            .recipes
            .iter()
            .find(|r| r.id == id)
            .map(|r| data.hydrate(r)))
    }

    async fn list_recipes(
        &self,
        filter: &RecipeFilter,
        limit: i64,
        offset: i64,
    ) -> RepoResult<(Vec<Recipe>, i64)> {
        let data = self.lock();
        let matching: Vec<Recipe> = data
            .recipes_newest_first()
            .into_iter()
            .filter(|r| filter.author.map_or(true, |a| r.author_id == a))
            .filter(|r| {
                filter.tags.is_empty()
                    || data
                        .tags
                        .iter()
                        .any(|t| r.tags.contains(&t.id) && filter.tags.contains(&t.slug))
            })
            .filter(|r| {
                filter.is_favorited.map_or(true, |want| {
                    data.in_list(RecipeList::Favorites, filter.viewer, r.id) == want
                })
            })
            .filter(|r| {
                filter.is_in_shopping_cart.map_or(true, |want| {
                    data.in_list(RecipeList::ShoppingCart, filter.viewer, r.id) == want
                })
            })
            .map(|r| data.hydrate(r))
            .collect();
        let total = matching.len() as i64;
        Ok((page(&matching, limit, offset), total))
    }

    async fn recipes_by_author(
        &self,
        author: Uuid,
        limit: Option<i64>,
    ) -> RepoResult<(Vec<Recipe>, i64)> {
        let data = self.lock();
        let all: Vec<Recipe> = data
            .recipes_newest_first()
            .into_iter()
            .filter(|r| r.author_id == author)
            .map(|r| data.hydrate(r))
            .collect();
        let total = all.len() as i64;
        let limited = match limit {
            Some(n) => page(&all, n, 0),
            None => all,
        };
        Ok((limited, total))
    }
}

#[async_trait]
impl MembershipRepo for MemoryStore {
    async fn add_to_list(&self, list: RecipeList, user: Uuid, recipe: i64) -> RepoResult<bool> {
        let mut data = self.lock();
        if !data.recipes.iter().any(|r| r.id == recipe) {
            return Err(RepoError::MissingReference("Unknown recipe".into()));
        }
        Ok(data.memberships.entry(list).or_default().insert((user, recipe)))
    }

    async fn remove_from_list(
        &self,
        list: RecipeList,
        user: Uuid,
        recipe: i64,
    ) -> RepoResult<bool> {
        Ok(self
            .lock()
            .memberships
            .get_mut(&list)
            .is_some_and(|set| set.remove(&(user, recipe))))
    }

    async fn in_list(&self, list: RecipeList, user: Uuid, recipe: i64) -> RepoResult<bool> {
        Ok(self.lock().in_list(list, Some(user), recipe))
    }

    async fn cart_ingredient_totals(&self, user: Uuid) -> RepoResult<Vec<IngredientTotal>> {
        let data = self.lock();
        let lines: Vec<RecipeIngredient> = data
            .recipes
            .iter()
            .filter(|r| data.in_list(RecipeList::ShoppingCart, Some(user), r.id))
            .flat_map(|r| data.hydrate(r).ingredients)
            .collect();
        let mut totals = shopping_list::aggregate(&lines);
        totals.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.measurement_unit.cmp(&b.measurement_unit))
        });
        Ok(totals)
    }
}

#[async_trait]
impl FollowRepo for MemoryStore {
    async fn follow(&self, user: Uuid, author: Uuid) -> RepoResult<bool> {
        let mut data = self.lock();
        if user == author {
            return Err(RepoError::Invalid("value rejected by no_self_follow".into()));
        }
        if data.follows.contains(&(user, author)) {
            return Ok(false);
        }
        data.follows.push((user, author));
        Ok(true)
    }

    async fn unfollow(&self, user: Uuid, author: Uuid) -> RepoResult<bool> {
        let mut data = self.lock();
        let before = data.follows.len();
        data.follows.retain(|f| *f != (user, author));
        Ok(data.follows.len() != before)
    }

    async fn is_following(&self, user: Uuid, author: Uuid) -> RepoResult<bool> {
        Ok(self.lock().follows.contains(&(user, author)))
    }

    async fn list_followed(
        &self,
        user: Uuid,
        limit: i64,
        offset: i64,
    ) -> RepoResult<(Vec<User>, i64)> {
        let data = self.lock();
        let followed: Vec<User> = data
            .follows
            .iter()
            .rev()
            .filter(|(u, _)| *u == user)
            .filter_map(|(_, author)| data.users.iter().find(|x| x.id == *author).cloned())
            .collect();
        let total = followed.len() as i64;
        Ok((page(&followed, limit, offset), total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed_user(store: &MemoryStore, name: &str) -> User {
        store
            .create_user(NewUser {
                email: format!("{name}@example.com"),
                username: name.to_string(),
                first_name: String::new(),
                last_name: String::new(),
                password_hash: "x".into(),
            })
            .await
            .expect("create user")
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let store = MemoryStore::new();
        seed_user(&store, "ann").await;
        let err = store
            .create_user(NewUser {
                email: "ann@example.com".into(),
                username: "other".into(),
                first_name: String::new(),
                last_name: String::new(),
                password_hash: "x".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)));
    }

    #[tokio::test]
    async fn membership_insert_is_at_most_once() {
        let store = MemoryStore::new();
        let user = seed_user(&store, "bob").await;
        store
            .insert_ingredients(&[
                NewIngredient { name: "salt".into(), measurement_unit: "g".into() },
                NewIngredient { name: "sugar".into(), measurement_unit: "g".into() },
            ])
            .await
            .unwrap();
        let tag = store
            .create_tag(NewTag { name: "Lunch".into(), color: "#00ff00".into(), slug: "lunch".into() })
            .await
            .unwrap();
        let ids: Vec<i64> = store
            .list_ingredients(None)
            .await
            .unwrap()
            .iter()
            .map(|i| i.id)
            .collect();
        let recipe = store
            .create_recipe(
                user.id,
                RecipeDraft {
                    name: "Soup".into(),
                    text: "Boil".into(),
                    image: "recipes/a.png".into(),
                    cooking_time: 10,
                    tags: vec![tag.id],
                    ingredients: ids.iter().map(|id| IngredientAmount { id: *id, amount: 1 }).collect(),
                },
            )
            .await
            .unwrap();

        assert!(store.add_to_list(RecipeList::Favorites, user.id, recipe).await.unwrap());
        assert!(!store.add_to_list(RecipeList::Favorites, user.id, recipe).await.unwrap());
        assert!(store.remove_from_list(RecipeList::Favorites, user.id, recipe).await.unwrap());
        assert!(!store.remove_from_list(RecipeList::Favorites, user.id, recipe).await.unwrap());
    }

    #[tokio::test]
    async fn ingredient_search_is_case_insensitive_prefix() {
        let store = MemoryStore::new();
        store
            .insert_ingredients(&[
                NewIngredient { name: "Salt".into(), measurement_unit: "g".into() },
                NewIngredient { name: "sea salt".into(), measurement_unit: "g".into() },
                NewIngredient { name: "Salt".into(), measurement_unit: "g".into() },
            ])
            .await
            .unwrap();
        let found = store.list_ingredients(Some("sa")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Salt");
        assert_eq!(store.list_ingredients(None).await.unwrap().len(), 2);
    }
}
