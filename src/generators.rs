//! Synthesis provider for `@gen:` expressions.
//!
//! Generators are registered under a `(category, method)` pair together with
//! their arity, documentation, and an optional post-processing hook. Lookup
//! of an unknown pair is a plain miss.

use crate::expression::Arg;
use chrono::{Duration, SecondsFormat, Utc};
use fake::faker::address::en::{BuildingNumber, CityName, CountryName, StateName, StreetName, ZipCode};
use fake::faker::company::en::{Buzzword, BuzzwordMiddle, BuzzwordTail, CompanyName};
use fake::faker::internet::en::{DomainSuffix, SafeEmail, Username, IPv4};
use fake::faker::lorem::en::{Paragraph, Sentence, Word, Words};
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use thiserror::Error;

/// Upper bound for count-style arguments (words, paragraphs, lengths).
const MAX_COUNT: i64 = 1_000;

/// Generator invocation errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeneratorError {
    #[error("{category}.{method} takes at most {max} arguments, got {got}")]
    Arity {
        category: String,
        method: String,
        max: usize,
        got: usize,
    },

    #[error("argument {index}: expected {expected}, got '{got}'")]
    InvalidArgument {
        index: usize,
        expected: &'static str,
        got: String,
    },

    #[error("invalid range: min {min}, max {max}")]
    InvalidRange { min: String, max: String },
}

/// Produces a value from positional arguments.
pub type GenerateFn = fn(&[Arg]) -> Result<Value, GeneratorError>;

/// Rewrites a generated value before substitution.
pub type PostProcessFn = fn(Value) -> Value;

/// Documentation grouping for the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    Person,
    Contact,
    Numeric,
    Date,
    Location,
    Commerce,
    Text,
    Image,
}

/// A registered generator.
#[derive(Clone)]
pub struct GeneratorSpec {
    pub family: Family,
    pub category: &'static str,
    pub method: &'static str,
    pub max_args: usize,
    pub description: &'static str,
    pub example: &'static str,
    generate: GenerateFn,
    post_process: Option<PostProcessFn>,
}

impl GeneratorSpec {
    pub fn new(
        family: Family,
        category: &'static str,
        method: &'static str,
        max_args: usize,
        description: &'static str,
        example: &'static str,
        generate: GenerateFn,
    ) -> Self {
        Self {
            family,
            category,
            method,
            max_args,
            description,
            example,
            generate,
            post_process: None,
        }
    }

    pub fn with_post_process(mut self, hook: PostProcessFn) -> Self {
        self.post_process = Some(hook);
        self
    }

    /// Check arity, generate, then post-process.
    pub fn call(&self, args: &[Arg]) -> Result<Value, GeneratorError> {
        if args.len() > self.max_args {
            return Err(GeneratorError::Arity {
                category: self.category.to_string(),
                method: self.method.to_string(),
                max: self.max_args,
                got: args.len(),
            });
        }
        let value = (self.generate)(args)?;
        Ok(match self.post_process {
            Some(hook) => hook(value),
            None => value,
        })
    }
}

/// One catalog row, for documentation and validation tooling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub family: Family,
    pub category: &'static str,
    pub method: &'static str,
    pub description: &'static str,
    pub example: &'static str,
}

/// Resolves `(category, method)` pairs into values.
pub trait SynthesisProvider: Send + Sync {
    /// `None` when the pair is unknown.
    fn resolve(&self, category: &str, method: &str, args: &[Arg]) -> Option<Result<Value, GeneratorError>>;

    /// Every known pair, in registration order.
    fn catalog(&self) -> Vec<CatalogEntry>;
}

/// Map-backed generator registry.
#[derive(Clone, Default)]
pub struct GeneratorRegistry {
    entries: Vec<GeneratorSpec>,
    index: HashMap<&'static str, HashMap<&'static str, usize>>,
}

impl GeneratorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in generator set.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for spec in builtin_generators() {
            registry.register(spec);
        }
        registry
    }

    /// Add or replace a generator.
    pub fn register(&mut self, spec: GeneratorSpec) {
        let slot = self.index.entry(spec.category).or_default();
        match slot.get(spec.method) {
            Some(&idx) => self.entries[idx] = spec,
            None => {
                slot.insert(spec.method, self.entries.len());
                self.entries.push(spec);
            }
        }
    }

    pub fn get(&self, category: &str, method: &str) -> Option<&GeneratorSpec> {
        let idx = *self.index.get(category)?.get(method)?;
        self.entries.get(idx)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SynthesisProvider for GeneratorRegistry {
    fn resolve(&self, category: &str, method: &str, args: &[Arg]) -> Option<Result<Value, GeneratorError>> {
        self.get(category, method).map(|spec| spec.call(args))
    }

    fn catalog(&self) -> Vec<CatalogEntry> {
        self.entries
            .iter()
            .map(|spec| CatalogEntry {
                family: spec.family,
                category: spec.category,
                method: spec.method,
                description: spec.description,
                example: spec.example,
            })
            .collect()
    }
}

// Argument decoding

fn int_arg(args: &[Arg], index: usize, default: i64) -> Result<i64, GeneratorError> {
    let invalid = |got: String| GeneratorError::InvalidArgument {
        index,
        expected: "integer",
        got,
    };
    match args.get(index) {
        None => Ok(default),
        Some(Arg::Int(n)) => Ok(*n),
        Some(Arg::Float(f)) if f.fract() == 0.0 => Ok(*f as i64),
        Some(Arg::Str(s)) | Some(Arg::Raw(s)) => s.trim().parse().map_err(|_| invalid(s.clone())),
        Some(other) => Err(invalid(other.to_string())),
    }
}

fn float_arg(args: &[Arg], index: usize, default: f64) -> Result<f64, GeneratorError> {
    let invalid = |got: String| GeneratorError::InvalidArgument {
        index,
        expected: "finite number",
        got,
    };
    let value = match args.get(index) {
        None => default,
        Some(Arg::Int(n)) => *n as f64,
        Some(Arg::Float(f)) => *f,
        Some(Arg::Str(s)) | Some(Arg::Raw(s)) => {
            s.trim().parse().map_err(|_| invalid(s.clone()))?
        }
        Some(other) => return Err(invalid(other.to_string())),
    };
    if !value.is_finite() {
        return Err(invalid(value.to_string()));
    }
    Ok(value)
}

fn count_arg(args: &[Arg], index: usize, default: i64) -> Result<usize, GeneratorError> {
    let n = int_arg(args, index, default)?;
    if !(0..=MAX_COUNT).contains(&n) {
        return Err(GeneratorError::InvalidArgument {
            index,
            expected: "count between 0 and 1000",
            got: n.to_string(),
        });
    }
    Ok(n as usize)
}

fn ordered<T: PartialOrd + ToString>(min: T, max: T) -> Result<(T, T), GeneratorError> {
    if !matches!(min.partial_cmp(&max), Some(Ordering::Less | Ordering::Equal)) {
        return Err(GeneratorError::InvalidRange {
            min: min.to_string(),
            max: max.to_string(),
        });
    }
    Ok((min, max))
}

/// Uniform draw from `[min, max]`. Bounds must be finite and the span must
/// not overflow.
fn float_in(min: f64, max: f64) -> Result<f64, GeneratorError> {
    let (min, max) = ordered(min, max)?;
    if min == max {
        return Ok(min);
    }
    if !(max - min).is_finite() {
        return Err(GeneratorError::InvalidRange {
            min: min.to_string(),
            max: max.to_string(),
        });
    }
    Ok(rand::thread_rng().gen_range(min..=max))
}

fn text(s: impl Into<String>) -> Result<Value, GeneratorError> {
    Ok(Value::String(s.into()))
}

fn pick(options: &[&str]) -> String {
    options
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or_default()
        .to_string()
}

fn round_to(value: f64, precision: usize) -> f64 {
    let factor = 10f64.powi(precision.min(15) as i32);
    (value * factor).round() / factor
}

fn strip_whitespace(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.split_whitespace().collect()),
        other => other,
    }
}

// person

fn person_first_name(_: &[Arg]) -> Result<Value, GeneratorError> {
    text(FirstName().fake::<String>())
}

fn person_last_name(_: &[Arg]) -> Result<Value, GeneratorError> {
    text(LastName().fake::<String>())
}

fn person_full_name(_: &[Arg]) -> Result<Value, GeneratorError> {
    text(Name().fake::<String>())
}

fn person_sex(_: &[Arg]) -> Result<Value, GeneratorError> {
    text(pick(&["male", "female"]))
}

// contact

fn internet_email(_: &[Arg]) -> Result<Value, GeneratorError> {
    text(SafeEmail().fake::<String>())
}

fn internet_username(_: &[Arg]) -> Result<Value, GeneratorError> {
    text(Username().fake::<String>())
}

fn internet_url(_: &[Arg]) -> Result<Value, GeneratorError> {
    let host: String = Word().fake();
    let suffix: String = DomainSuffix().fake();
    text(format!("https://{}.{}", host.to_lowercase(), suffix))
}

fn internet_ip(_: &[Arg]) -> Result<Value, GeneratorError> {
    text(IPv4().fake::<String>())
}

fn phone_number(_: &[Arg]) -> Result<Value, GeneratorError> {
    text(PhoneNumber().fake::<String>())
}

// numeric

/// `int()`, `int(max)` or `int(min, max)`, inclusive.
fn number_int(args: &[Arg]) -> Result<Value, GeneratorError> {
    let (min, max) = match args.len() {
        0 => (0, i32::MAX as i64),
        1 => (0, int_arg(args, 0, 0)?),
        _ => (int_arg(args, 0, 0)?, int_arg(args, 1, 0)?),
    };
    let (min, max) = ordered(min, max)?;
    Ok(Value::from(rand::thread_rng().gen_range(min..=max)))
}

/// `float(min = 0, max = 1, precision = 2)`.
fn number_float(args: &[Arg]) -> Result<Value, GeneratorError> {
    let value = float_in(float_arg(args, 0, 0.0)?, float_arg(args, 1, 1.0)?)?;
    let precision = count_arg(args, 2, 2)?;
    Ok(Value::from(round_to(value, precision)))
}

fn datatype_boolean(_: &[Arg]) -> Result<Value, GeneratorError> {
    Ok(Value::Bool(rand::thread_rng().gen_bool(0.5)))
}

fn string_uuid(_: &[Arg]) -> Result<Value, GeneratorError> {
    text(uuid::Uuid::new_v4().to_string())
}

fn string_alphanumeric(args: &[Arg]) -> Result<Value, GeneratorError> {
    let len = count_arg(args, 0, 10)?;
    let s: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect();
    text(s)
}

fn string_numeric(args: &[Arg]) -> Result<Value, GeneratorError> {
    let len = count_arg(args, 0, 10)?;
    let mut rng = rand::thread_rng();
    let s: String = (0..len)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect();
    text(s)
}

// date

fn offset_from_now(max_ms: i64, forward: bool) -> Result<Value, GeneratorError> {
    let offset = rand::thread_rng().gen_range(0..=max_ms.max(1));
    let delta = Duration::milliseconds(if forward { offset } else { -offset });
    text((Utc::now() + delta).to_rfc3339_opts(SecondsFormat::Millis, true))
}

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// `past(years = 1)`.
fn date_past(args: &[Arg]) -> Result<Value, GeneratorError> {
    offset_from_now(count_arg(args, 0, 1)? as i64 * 365 * DAY_MS, false)
}

/// `future(years = 1)`.
fn date_future(args: &[Arg]) -> Result<Value, GeneratorError> {
    offset_from_now(count_arg(args, 0, 1)? as i64 * 365 * DAY_MS, true)
}

/// `recent(days = 1)`.
fn date_recent(args: &[Arg]) -> Result<Value, GeneratorError> {
    offset_from_now(count_arg(args, 0, 1)? as i64 * DAY_MS, false)
}

/// `soon(days = 1)`.
fn date_soon(args: &[Arg]) -> Result<Value, GeneratorError> {
    offset_from_now(count_arg(args, 0, 1)? as i64 * DAY_MS, true)
}

fn date_anytime(_: &[Arg]) -> Result<Value, GeneratorError> {
    offset_from_now(50 * 365 * DAY_MS, rand::thread_rng().gen_bool(0.5))
}

// location

fn location_state(_: &[Arg]) -> Result<Value, GeneratorError> {
    text(StateName().fake::<String>())
}

fn location_city(_: &[Arg]) -> Result<Value, GeneratorError> {
    text(CityName().fake::<String>())
}

fn location_street_address(_: &[Arg]) -> Result<Value, GeneratorError> {
    let number: String = BuildingNumber().fake();
    let street: String = StreetName().fake();
    text(format!("{number} {street}"))
}

fn location_zip_code(_: &[Arg]) -> Result<Value, GeneratorError> {
    text(ZipCode().fake::<String>())
}

fn location_country(_: &[Arg]) -> Result<Value, GeneratorError> {
    text(CountryName().fake::<String>())
}

// commerce

fn company_name(_: &[Arg]) -> Result<Value, GeneratorError> {
    text(CompanyName().fake::<String>())
}

fn company_catch_phrase(_: &[Arg]) -> Result<Value, GeneratorError> {
    let head: String = Buzzword().fake();
    let middle: String = BuzzwordMiddle().fake();
    let tail: String = BuzzwordTail().fake();
    text(format!("{head} {middle} {tail}"))
}

const PRODUCT_ADJECTIVES: &[&str] = &[
    "Small", "Ergonomic", "Rustic", "Intelligent", "Gorgeous", "Incredible", "Fantastic",
    "Practical", "Sleek", "Awesome", "Handcrafted", "Licensed", "Refined", "Tasty",
];
const PRODUCT_MATERIALS: &[&str] = &[
    "Steel", "Wooden", "Concrete", "Plastic", "Cotton", "Granite", "Rubber", "Metal", "Soft",
    "Fresh", "Frozen", "Bronze",
];
const PRODUCT_NAMES: &[&str] = &[
    "Chair", "Car", "Computer", "Keyboard", "Mouse", "Bike", "Ball", "Gloves", "Pants", "Shirt",
    "Table", "Shoes", "Hat", "Towels", "Soap", "Tuna", "Chicken", "Fish", "Cheese", "Bacon",
];
const DEPARTMENTS: &[&str] = &[
    "Books", "Movies", "Music", "Games", "Electronics", "Computers", "Home", "Garden", "Tools",
    "Grocery", "Health", "Beauty", "Toys", "Kids", "Baby", "Clothing", "Shoes", "Jewelery",
    "Sports", "Outdoors", "Automotive", "Industrial",
];

fn commerce_product_name(_: &[Arg]) -> Result<Value, GeneratorError> {
    text(format!(
        "{} {} {}",
        pick(PRODUCT_ADJECTIVES),
        pick(PRODUCT_MATERIALS),
        pick(PRODUCT_NAMES)
    ))
}

/// `price(min = 1, max = 1000, decimals = 2)`, rendered as a string.
fn commerce_price(args: &[Arg]) -> Result<Value, GeneratorError> {
    let value = float_in(float_arg(args, 0, 1.0)?, float_arg(args, 1, 1000.0)?)?;
    let decimals = count_arg(args, 2, 2)?.min(15);
    text(format!("{value:.decimals$}"))
}

fn commerce_department(_: &[Arg]) -> Result<Value, GeneratorError> {
    text(pick(DEPARTMENTS))
}

// text

fn lorem_word(_: &[Arg]) -> Result<Value, GeneratorError> {
    text(Word().fake::<String>())
}

/// `words(count = 3)`.
fn lorem_words(args: &[Arg]) -> Result<Value, GeneratorError> {
    let n = count_arg(args, 0, 3)?;
    let words: Vec<String> = Words(n..n + 1).fake();
    text(words.join(" "))
}

/// `sentence()` or `sentence(wordCount)`.
fn lorem_sentence(args: &[Arg]) -> Result<Value, GeneratorError> {
    let range = match args.first() {
        Some(_) => {
            let n = count_arg(args, 0, 0)?;
            n..n + 1
        }
        None => 4..10,
    };
    text(Sentence(range).fake::<String>())
}

/// `paragraph(sentenceCount = 3)`.
fn lorem_paragraph(args: &[Arg]) -> Result<Value, GeneratorError> {
    let n = count_arg(args, 0, 3)?;
    text(Paragraph(n..n + 1).fake::<String>())
}

/// `paragraphs(count = 3)`, separated by newlines.
fn lorem_paragraphs(args: &[Arg]) -> Result<Value, GeneratorError> {
    let n = count_arg(args, 0, 3)?;
    let paragraphs: Vec<String> = (0..n).map(|_| Paragraph(3..4).fake::<String>()).collect();
    text(paragraphs.join("\n"))
}

// image

fn image_avatar(_: &[Arg]) -> Result<Value, GeneratorError> {
    let id = rand::thread_rng().gen_range(1..100_000_000u64);
    text(format!("https://avatars.githubusercontent.com/u/{id}"))
}

/// `url(width = 640, height = 480)`.
fn image_url(args: &[Arg]) -> Result<Value, GeneratorError> {
    let width = int_arg(args, 0, 640)?;
    let height = int_arg(args, 1, 480)?;
    let seed: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    text(format!("https://picsum.photos/seed/{seed}/{width}/{height}"))
}

fn builtin_generators() -> Vec<GeneratorSpec> {
    use Family::*;
    vec![
        GeneratorSpec::new(Person, "person", "firstName", 0, "Random first name", "@gen:person.firstName", person_first_name),
        GeneratorSpec::new(Person, "person", "lastName", 0, "Random last name", "@gen:person.lastName", person_last_name),
        GeneratorSpec::new(Person, "person", "fullName", 0, "First and last name", "@gen:person.fullName", person_full_name),
        GeneratorSpec::new(Person, "person", "sex", 0, "male or female", "@gen:person.sex", person_sex),
        GeneratorSpec::new(Contact, "internet", "email", 0, "Email address on a safe domain", "@gen:internet.email", internet_email),
        GeneratorSpec::new(Contact, "internet", "username", 0, "User name", "@gen:internet.username", internet_username),
        GeneratorSpec::new(Contact, "internet", "url", 0, "HTTPS URL", "@gen:internet.url", internet_url),
        GeneratorSpec::new(Contact, "internet", "ip", 0, "IPv4 address", "@gen:internet.ip", internet_ip),
        GeneratorSpec::new(Contact, "phone", "number", 0, "Phone number", "@gen:phone.number", phone_number),
        GeneratorSpec::new(Numeric, "number", "int", 2, "Integer in [min, max]; one argument is max", "@gen:number.int(0,100)", number_int),
        GeneratorSpec::new(Numeric, "number", "float", 3, "Decimal in [min, max] rounded to precision", "@gen:number.float(0,100,2)", number_float),
        GeneratorSpec::new(Numeric, "datatype", "boolean", 0, "true or false", "@gen:datatype.boolean", datatype_boolean),
        GeneratorSpec::new(Numeric, "string", "uuid", 0, "Random v4 UUID", "@gen:string.uuid", string_uuid),
        GeneratorSpec::new(Numeric, "string", "alphanumeric", 1, "Alphanumeric string of a length", "@gen:string.alphanumeric(10)", string_alphanumeric),
        GeneratorSpec::new(Numeric, "string", "numeric", 1, "Digit string of a length", "@gen:string.numeric(6)", string_numeric),
        GeneratorSpec::new(Date, "date", "past", 1, "Timestamp within the past N years", "@gen:date.past", date_past),
        GeneratorSpec::new(Date, "date", "future", 1, "Timestamp within the next N years", "@gen:date.future", date_future),
        GeneratorSpec::new(Date, "date", "recent", 1, "Timestamp within the past N days", "@gen:date.recent", date_recent),
        GeneratorSpec::new(Date, "date", "soon", 1, "Timestamp within the next N days", "@gen:date.soon", date_soon),
        GeneratorSpec::new(Date, "date", "anytime", 0, "Timestamp within fifty years of now", "@gen:date.anytime", date_anytime),
        GeneratorSpec::new(Location, "location", "state", 0, "State or province", "@gen:location.state", location_state),
        GeneratorSpec::new(Location, "location", "city", 0, "City name", "@gen:location.city", location_city),
        GeneratorSpec::new(Location, "location", "streetAddress", 0, "Building number and street", "@gen:location.streetAddress", location_street_address),
        GeneratorSpec::new(Location, "location", "zipCode", 0, "Postal code", "@gen:location.zipCode", location_zip_code),
        GeneratorSpec::new(Location, "location", "country", 0, "Country name", "@gen:location.country", location_country),
        GeneratorSpec::new(Commerce, "company", "name", 0, "Company name", "@gen:company.name", company_name),
        GeneratorSpec::new(Commerce, "company", "catchPhrase", 0, "Marketing catch phrase", "@gen:company.catchPhrase", company_catch_phrase),
        GeneratorSpec::new(Commerce, "commerce", "productName", 0, "Product name without spaces", "@gen:commerce.productName", commerce_product_name)
            .with_post_process(strip_whitespace),
        GeneratorSpec::new(Commerce, "commerce", "price", 3, "Price string in [min, max]", "@gen:commerce.price(1,100)", commerce_price),
        GeneratorSpec::new(Commerce, "commerce", "department", 0, "Store department", "@gen:commerce.department", commerce_department),
        GeneratorSpec::new(Text, "lorem", "word", 0, "Single word", "@gen:lorem.word", lorem_word),
        GeneratorSpec::new(Text, "lorem", "words", 1, "N words separated by spaces", "@gen:lorem.words(3)", lorem_words),
        GeneratorSpec::new(Text, "lorem", "sentence", 1, "Sentence, optionally of N words", "@gen:lorem.sentence", lorem_sentence),
        GeneratorSpec::new(Text, "lorem", "paragraph", 1, "Paragraph of N sentences", "@gen:lorem.paragraph", lorem_paragraph),
        GeneratorSpec::new(Text, "lorem", "paragraphs", 1, "N paragraphs separated by newlines", "@gen:lorem.paragraphs(3)", lorem_paragraphs),
        GeneratorSpec::new(Image, "image", "avatar", 0, "Avatar image URL", "@gen:image.avatar", image_avatar),
        GeneratorSpec::new(Image, "image", "url", 2, "Placeholder image URL of a size", "@gen:image.url(640,480)", image_url),
    ]
}
