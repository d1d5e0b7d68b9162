//! Catalog categories

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubCategory {
    pub name: String,
    #[serde(default)]
    pub product_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub sku: String,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub children: Vec<SubCategory>,
    pub order: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const DEFAULT_CATALOG: &[(&str, &str, &str, &str, &[&str])] = &[
    ("TLSFL00001", "Festivals", "festivals", "Festive decorations and items", &["Torans", "Door Décor/Hanging", "Garlands", "Decorations", "Rangoli"]),
    ("TLSWD00001", "Wall Décor", "wall-decor", "Wall decorations and hangings", &["Wall Hangings", "Paintings", "Frames", "Mirrors", "Clocks"]),
    ("TLSLT00001", "Lighting", "lighting", "Decorative lighting solutions", &["Candles", "Diyas", "Lanterns", "Decorative Lights"]),
    ("TLSHA00001", "Home Accent", "home-accent", "Home decoration accents", &["Cushion Covers", "Table Décor", "Vases", "Showpieces"]),
    ("TLSDC00001", "Divine Collections", "divine-collections", "Religious and spiritual items", &["Idols", "Pooja Items", "Spiritual Décor"]),
    ("TLSSB00001", "Storage & Bags", "storage-bags", "Storage solutions and bags", &["Storage Boxes", "Bags", "Organizers"]),
    ("TLSGF00001", "Gifting", "gifting", "Gift items and hampers", &["Gift Sets", "Hampers", "Personalized Gifts"]),
];

pub fn default_categories(now: DateTime<Utc>) -> Vec<Category> {
    DEFAULT_CATALOG
        .iter()
        .enumerate()
        .map(|(i, (sku, name, slug, description, children))| Category {
            id: format!("cat_{}", i + 1),
            sku: (*sku).into(),
            name: (*name).into(),
            slug: (*slug).into(),
            description: (*description).into(),
            children: children.iter().map(|c| SubCategory { name: (*c).into(), product_count: 0 }).collect(),
            order: i as u32 + 1,
            created_at: now,
            updated_at: now,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_is_ordered() {
        let cats = default_categories(Utc::now());
        assert_eq!(cats.len(), 7);
        assert_eq!(cats[0].id, "cat_1");
        assert_eq!(cats[1].slug, "wall-decor");
        assert!(cats.windows(2).all(|w| w[0].order < w[1].order));
    }
}
