use contracts::domain::a001_product::{Product, ProductFields};

use crate::domain::a001_product::service::parse_decimal;

/// Перевод товара внешнего каталога в поля локального товара.
/// Отсутствующие brand/category/thumbnail становятся пустой строкой.
pub fn to_product_fields(item: &contracts::usecases::u101_import_catalog::CatalogItem) -> ProductFields {
    ProductFields {
        external_id: item.id,
        title: item.title.clone(),
        description: item.description.clone(),
        price: item.price,
        discount_percentage: item.discount_percentage,
        rating: item.rating,
        stock: item.stock,
        brand: item.brand.clone().unwrap_or_default(),
        category: item.category.clone().unwrap_or_default(),
        thumbnail: item.thumbnail.clone().unwrap_or_default(),
        images: item.images.clone(),
    }
}

fn decimal_differs(stored: &str, incoming: f64) -> bool {
    match parse_decimal(stored) {
        Some(value) => value != incoming,
        None => true,
    }
}

/// Отличается ли хоть одно синхронизируемое поле.
///
/// Десятичные поля сравниваются как числа (`"19.99"` равно `19.99`),
/// массив картинок сравнивается поэлементно с учетом порядка.
pub fn has_changes(existing: &Product, incoming: &ProductFields) -> bool {
    existing.title != incoming.title
        || existing.description != incoming.description
        || decimal_differs(&existing.price, incoming.price)
        || decimal_differs(&existing.discount_percentage, incoming.discount_percentage)
        || decimal_differs(&existing.rating, incoming.rating)
        || existing.stock != incoming.stock
        || existing.brand != incoming.brand
        || existing.category != incoming.category
        || existing.thumbnail != incoming.thumbnail
        || existing.images != incoming.images
}
