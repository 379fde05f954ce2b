mod helpers;
mod ingredient;
mod recipe;
mod user;

pub(crate) use ingredient::cmd_ingredient_list;
pub(crate) use recipe::{cmd_recipe_list, cmd_recipe_show};
pub(crate) use user::cmd_user_list;
