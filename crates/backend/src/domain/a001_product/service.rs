use contracts::domain::a001_product::{Product, ProductFields, ProductId};
use contracts::domain::common::EntityMetadata;

/// Текстовое представление десятичного поля для хранения.
///
/// Округление не применяется: `19.99` хранится как `"19.99"`, а при
/// сравнении строка снова разбирается в число.
pub fn decimal_text(value: f64) -> String {
    value.to_string()
}

/// Разбор десятичного поля, сохраненного строкой
pub fn parse_decimal(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok()
}

/// Новый товар из набора полей
pub fn new_product(fields: &ProductFields) -> Product {
    let mut product = Product {
        id: ProductId::new_v4(),
        external_id: fields.external_id,
        title: String::new(),
        description: String::new(),
        price: String::new(),
        discount_percentage: String::new(),
        rating: String::new(),
        stock: 0,
        brand: String::new(),
        category: String::new(),
        thumbnail: String::new(),
        images: Vec::new(),
        metadata: EntityMetadata::new(),
    };
    apply_fields(&mut product, fields);
    product
}

/// Перенести поля в существующий товар (id и дата создания сохраняются)
pub fn apply_fields(product: &mut Product, fields: &ProductFields) {
    product.external_id = fields.external_id;
    product.title = fields.title.clone();
    product.description = fields.description.clone();
    product.price = decimal_text(fields.price);
    product.discount_percentage = decimal_text(fields.discount_percentage);
    product.rating = decimal_text(fields.rating);
    product.stock = fields.stock;
    product.brand = fields.brand.clone();
    product.category = fields.category.clone();
    product.thumbnail = fields.thumbnail.clone();
    product.images = fields.images.clone();
    product.metadata.touch();
}
