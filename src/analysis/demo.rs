use crate::analysis::normalize::{Condition, Listing, ListingOrigin, ListingTier};

struct DemoEntry {
    id: &'static str,
    title: &'static str,
    price: f64,
    sold_quantity: u32,
    available_quantity: u32,
    tier: ListingTier,
    category_id: &'static str,
}

/// The one fixed fallback dataset, shared by the catalog fallback and the
/// analyze not-found fallback. Entries carry no permalink so nobody is
/// sent to a marketplace page that does not exist.
const DEMO_POOL: [DemoEntry; 5] = [
    DemoEntry {
        id: "MLB123456789",
        title: "Smartphone Samsung Galaxy A54 128GB 6GB RAM Dual Sim",
        price: 1299.99,
        sold_quantity: 5847,
        available_quantity: 50,
        tier: ListingTier::Premium,
        category_id: "MLB1055",
    },
    DemoEntry {
        id: "MLB987654321",
        title: "Notebook Lenovo IdeaPad 3 15.6\" Intel i5 8GB 256GB SSD",
        price: 2899.90,
        sold_quantity: 2341,
        available_quantity: 23,
        tier: ListingTier::Classic,
        category_id: "MLB1649",
    },
    DemoEntry {
        id: "MLB555666777",
        title: "Apple AirPods Pro 2ª Geração com Case MagSafe",
        price: 1899.99,
        sold_quantity: 8765,
        available_quantity: 120,
        tier: ListingTier::Premium,
        category_id: "MLB1276",
    },
    DemoEntry {
        id: "MLB111222333",
        title: "Smart TV LG 55\" 4K UHD ThinQ AI",
        price: 2199.00,
        sold_quantity: 1456,
        available_quantity: 34,
        tier: ListingTier::Classic,
        category_id: "MLB1002",
    },
    DemoEntry {
        id: "MLB444555666",
        title: "Console PlayStation 5 825GB SSD",
        price: 3999.99,
        sold_quantity: 3278,
        available_quantity: 15,
        tier: ListingTier::Premium,
        category_id: "MLB1144",
    },
];

fn listing_from_entry(entry: &DemoEntry) -> Listing {
    Listing {
        id: entry.id.to_string(),
        title: entry.title.to_string(),
        price: entry.price,
        sold_quantity: entry.sold_quantity,
        available_quantity: entry.available_quantity,
        condition: Condition::New,
        free_shipping: true,
        listing_tier: entry.tier,
        category_id: Some(entry.category_id.to_string()),
        permalink: None,
        origin: ListingOrigin::Demo,
    }
}

pub fn catalog() -> Vec<Listing> {
    DEMO_POOL.iter().map(listing_from_entry).collect()
}

pub fn find(id: &str) -> Option<Listing> {
    DEMO_POOL
        .iter()
        .find(|entry| entry.id == id)
        .map(listing_from_entry)
}

pub fn size() -> usize {
    DEMO_POOL.len()
}
