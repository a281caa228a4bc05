//! API request/response models for products.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::Value;
use serde_with::rust::double_option;
use url::Url;
use utoipa::ToSchema;

use super::{FieldErrors, NULL, REQUIRED, check_decimal, money, required_string};
use crate::db::models::products::{ProductCreateDBRequest, ProductDBResponse, ProductUpdateDBRequest};
use crate::types::ProductId;

const NAME_MAX: usize = 255;
const IMAGE_MAX: usize = 200;
const PRICE_DIGITS: usize = 10;
const PRICE_PLACES: usize = 2;

/// Product create payload. Every field is optional at parse time so that
/// [`ProductCreate::validate`] can report all missing fields at once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProductCreate {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "Margherita")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Decimal with at most 10 digits and 2 decimal places
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, example = "9.99")]
    pub price: Option<Decimal>,
    /// Image URL (max 200 characters)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Product update payload. Absent fields are left unchanged; `image: null` clears the image.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ProductUpdate {
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub name: Option<Option<String>>,
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<String>, example = "9.99")]
    pub price: Option<Option<Decimal>>,
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub image: Option<Option<String>>,
}

/// Create body: a single product or a list of them.
#[derive(Debug, Clone)]
pub enum ProductPayload {
    Many(Vec<ProductCreate>),
    One(ProductCreate),
}

impl<'de> Deserialize<'de> for ProductPayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| {
                    serde_json::from_value::<ProductCreate>(item)
                        .map_err(|e| de::Error::custom(format!("item {index}: {e}")))
                })
                .collect::<Result<Vec<_>, D::Error>>()
                .map(ProductPayload::Many),
            object @ Value::Object(_) => serde_json::from_value(object)
                .map(ProductPayload::One)
                .map_err(de::Error::custom),
            _ => Err(de::Error::custom("expected a product object or a list of products")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductResponse {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    #[schema(value_type = String, example = "9.99")]
    pub price: Decimal,
    pub image: Option<String>,
}

impl From<ProductDBResponse> for ProductResponse {
    fn from(db: ProductDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            description: db.description,
            price: money(db.price),
            image: db.image,
        }
    }
}

fn validate_image(errors: &mut FieldErrors, value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if value.chars().count() > IMAGE_MAX {
        errors.add("image", format!("Ensure this field has no more than {IMAGE_MAX} characters."));
        return None;
    }
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https" | "ftp" | "ftps") && url.host().is_some() => {
            Some(value.to_string())
        }
        _ => {
            errors.add("image", "Enter a valid URL.");
            None
        }
    }
}

fn validate_price(errors: &mut FieldErrors, price: Decimal) -> Option<Decimal> {
    match check_decimal(price, PRICE_DIGITS, PRICE_PLACES) {
        Ok(price) if price.is_sign_negative() && !price.is_zero() => {
            errors.add("price", "Ensure this value is greater than or equal to 0.");
            None
        }
        Ok(price) => Some(price),
        Err(message) => {
            errors.add("price", message);
            None
        }
    }
}

fn non_null_string(errors: &mut FieldErrors, field: &str, value: &Option<Option<String>>, max_len: usize) -> Option<String> {
    match value {
        None => None,
        Some(None) => {
            errors.add(field, NULL);
            None
        }
        Some(Some(s)) => required_string(errors, field, Some(s.as_str()), max_len),
    }
}

impl ProductCreate {
    /// True when the payload carries no fields at all, e.g. `{}`.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Check every field, collecting all failures.
    pub fn validate(&self) -> Result<ProductCreateDBRequest, FieldErrors> {
        let mut errors = FieldErrors::new();
        let name = required_string(&mut errors, "name", self.name.as_deref(), NAME_MAX);
        let description = required_string(&mut errors, "description", self.description.as_deref(), usize::MAX);
        let price = match self.price {
            None => {
                errors.add("price", REQUIRED);
                None
            }
            Some(price) => validate_price(&mut errors, price),
        };
        let image = self.image.as_deref().and_then(|image| validate_image(&mut errors, image));

        match (name, description, price) {
            (Some(name), Some(description), Some(price)) if errors.is_empty() => Ok(ProductCreateDBRequest {
                name,
                description,
                price,
                image,
            }),
            _ => Err(errors),
        }
    }
}

impl ProductUpdate {
    /// Check the fields that are present. Only `image` may be set to `null`.
    pub fn validate(&self) -> Result<ProductUpdateDBRequest, FieldErrors> {
        let mut errors = FieldErrors::new();
        let name = non_null_string(&mut errors, "name", &self.name, NAME_MAX);
        let description = non_null_string(&mut errors, "description", &self.description, usize::MAX);
        let price = match self.price {
            None => None,
            Some(None) => {
                errors.add("price", NULL);
                None
            }
            Some(Some(price)) => validate_price(&mut errors, price),
        };
        let image = self
            .image
            .as_ref()
            .map(|image| image.as_deref().and_then(|image| validate_image(&mut errors, image)));

        let update = ProductUpdateDBRequest {
            name,
            description,
            price,
            image,
        };
        if errors.is_empty() { Ok(update) } else { Err(errors) }
    }
}

impl ProductPayload {
    pub fn is_list(&self) -> bool {
        matches!(self, ProductPayload::Many(_))
    }

    /// The products to create, or `None` when there are none (`[]` or `{}`).
    pub fn into_items(self) -> Option<Vec<ProductCreate>> {
        match self {
            ProductPayload::Many(items) if !items.is_empty() => Some(items),
            ProductPayload::One(item) if !item.is_empty() => Some(vec![item]),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn product(body: Value) -> ProductCreate {
        serde_json::from_value(body).unwrap()
    }

    fn update(body: Value) -> ProductUpdate {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn valid_product() {
        let product = product(json!({
            "name": "Margherita",
            "description": "Tomato and mozzarella",
            "price": "8.50",
            "image": "https://img.example.com/m.png",
        }))
        .validate()
        .unwrap();
        assert_eq!(product.name, "Margherita");
        assert_eq!(product.price, Decimal::new(850, 2));
        assert_eq!(product.image.as_deref(), Some("https://img.example.com/m.png"));
    }

    #[test]
    fn blank_image_is_none() {
        let product = product(json!({ "name": "a", "description": "b", "price": 1, "image": "" }))
            .validate()
            .unwrap();
        assert!(product.image.is_none());
    }

    #[test]
    fn all_field_errors_are_reported() {
        let errors = product(json!({
            "name": "",
            "price": "1.999",
            "image": "not a url",
        }))
        .validate()
        .unwrap_err();
        assert_eq!(
            errors.to_value(),
            json!({
                "name": ["This field may not be blank."],
                "description": ["This field is required."],
                "price": ["Ensure that there are no more than 2 decimal places."],
                "image": ["Enter a valid URL."],
            })
        );
    }

    #[test]
    fn negative_price_is_rejected() {
        let errors = product(json!({ "name": "a", "description": "b", "price": "-1.00" }))
            .validate()
            .unwrap_err();
        assert_eq!(
            errors.to_value(),
            json!({ "price": ["Ensure this value is greater than or equal to 0."] })
        );
    }

    #[test]
    fn mistyped_fields_fail_to_parse() {
        for body in [
            json!({ "name": 5 }),
            json!({ "price": "free" }),
            json!({ "image": ["x"] }),
        ] {
            assert!(serde_json::from_value::<ProductCreate>(body).is_err());
        }
    }

    #[test]
    fn partial_update_only_touches_present_fields() {
        let partial = update(json!({ "price": "3.10" })).validate().unwrap();
        assert_eq!(partial.price, Some(Decimal::new(310, 2)));
        assert!(partial.name.is_none());
        assert!(partial.image.is_none());

        let clear = update(json!({ "image": null })).validate().unwrap();
        assert_eq!(clear.image, Some(None));

        let errors = update(json!({ "name": null, "price": null })).validate().unwrap_err();
        assert_eq!(
            errors.to_value(),
            json!({ "name": ["This field may not be null."], "price": ["This field may not be null."] })
        );
    }

    #[test]
    fn response_renders_two_decimal_places() {
        let now = chrono::Utc::now();
        let response = ProductResponse::from(ProductDBResponse {
            id: "pro1".to_string(),
            name: "Tea".to_string(),
            description: "Hot".to_string(),
            price: Decimal::from(2),
            image: None,
            created_at: now,
            modified: now,
        });
        assert_eq!(serde_json::to_value(&response).unwrap()["price"], "2.00");
    }

    #[test]
    fn payload_wraps_objects_and_rejects_empty_bodies() {
        let parse = |body: Value| serde_json::from_value::<ProductPayload>(body);

        let many = parse(json!([{ "name": "a" }, {}])).unwrap();
        assert!(many.is_list());
        assert_eq!(many.into_items().unwrap().len(), 2);

        let one = parse(json!({ "name": "a" })).unwrap();
        assert!(!one.is_list());
        assert_eq!(
            one.into_items().unwrap(),
            vec![ProductCreate {
                name: Some("a".to_string()),
                ..Default::default()
            }]
        );

        for empty in [json!([]), json!({})] {
            assert!(parse(empty).unwrap().into_items().is_none());
        }
        assert!(parse(json!("text")).is_err());
        assert!(parse(json!([1, 2])).is_err());
        // A list is never read as the fields of one product
        assert!(parse(json!(["a", "b", "9.99", null])).is_err());

        let error = parse(json!([{}, { "price": "abc" }])).unwrap_err().to_string();
        assert!(error.starts_with("item 1: "), "{error}");
    }
}
