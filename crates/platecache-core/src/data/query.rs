//! Filters and projections over a restaurant list.
//!
//! All functions preserve the input order.

use std::collections::HashSet;

use crate::models::Restaurant;

/// Filter value that matches every cuisine or neighborhood.
pub const ALL: &str = "all";

pub fn by_id(restaurants: Vec<Restaurant>, id: i64) -> Option<Restaurant> {
    restaurants.into_iter().find(|r| r.id == id)
}

pub fn by_cuisine(restaurants: Vec<Restaurant>, cuisine: &str) -> Vec<Restaurant> {
    restaurants.into_iter().filter(|r| r.cuisine_type == cuisine).collect()
}

pub fn by_neighborhood(restaurants: Vec<Restaurant>, neighborhood: &str) -> Vec<Restaurant> {
    restaurants.into_iter().filter(|r| r.neighborhood == neighborhood).collect()
}

/// Filter on both dimensions; `"all"` disables the filter for that dimension.
pub fn by_cuisine_and_neighborhood(
    restaurants: Vec<Restaurant>,
    cuisine: &str,
    neighborhood: &str,
) -> Vec<Restaurant> {
    restaurants
        .into_iter()
        .filter(|r| cuisine == ALL || r.cuisine_type == cuisine)
        .filter(|r| neighborhood == ALL || r.neighborhood == neighborhood)
        .collect()
}

/// Remove duplicates, keeping each value at its first position.
pub fn distinct<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(*v))
        .map(str::to_string)
        .collect()
}

pub fn neighborhoods(restaurants: &[Restaurant]) -> Vec<String> {
    distinct(restaurants.iter().map(|r| r.neighborhood.as_str()))
}

pub fn cuisines(restaurants: &[Restaurant]) -> Vec<String> {
    distinct(restaurants.iter().map(|r| r.cuisine_type.as_str()))
}
