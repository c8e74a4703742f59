//! Sort specifications for repository queries.
//!
//! A [`Sort`] is either an explicit, ordered list of [`Order`]s or the compact
//! `"<field>,<direction>"` form commonly bound from a request's `sort` query parameter.
//!
//! ```ignore
//! use docrepo::sort::{Direction, Sort};
//!
//! let compact = Sort::from_expression("created_at,desc");
//! let explicit = Sort::by(Direction::Asc, ["last_name", "first_name"]);
//!
//! assert_eq!(compact.orders().len(), 1);
//! assert_eq!(explicit.orders().len(), 2);
//! ```

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

/// The field name drivers use for the primary key.
pub(crate) const PRIMARY_KEY: &str = "_id";

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "&'static str")]
pub enum Direction {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    #[default]
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl Direction {
    /// Direction used when a sort expression names no valid direction.
    pub const DEFAULT: Direction = Direction::Asc;

    /// Parses `asc` or `desc`, ignoring case.
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("asc") {
            Some(Direction::Asc)
        } else if value.eq_ignore_ascii_case("desc") {
            Some(Direction::Desc)
        } else {
            None
        }
    }

    /// Parses a direction, falling back to [`Direction::DEFAULT`] for empty or unknown input.
    pub fn parse_or_default(value: &str) -> Self {
        Self::parse(value).unwrap_or(Self::DEFAULT)
    }

    /// Returns the lowercase wire form of this direction.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }

    /// Returns the value drivers expect in a sort document (`1` or `-1`).
    pub fn sort_value(&self) -> i32 {
        match self {
            Direction::Asc => 1,
            Direction::Desc => -1,
        }
    }
}

impl From<String> for Direction {
    fn from(value: String) -> Self {
        Direction::parse_or_default(&value)
    }
}

impl From<Direction> for &'static str {
    fn from(direction: Direction) -> Self {
        direction.as_str()
    }
}

/// A single sort key: a property and the direction to order it by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// The property (field name) to sort by.
    pub property: String,
    /// The sort direction.
    #[serde(default)]
    pub direction: Direction,
}

impl Order {
    /// Creates a new order for the given property and direction.
    pub fn new(property: impl Into<String>, direction: Direction) -> Self {
        Self { property: property.into(), direction }
    }

    /// Creates an ascending order for the given property.
    pub fn asc(property: impl Into<String>) -> Self {
        Self::new(property, Direction::Asc)
    }

    /// Creates a descending order for the given property.
    pub fn desc(property: impl Into<String>) -> Self {
        Self::new(property, Direction::Desc)
    }
}

/// Sort specification for query results.
///
/// Holds either explicit orders or a compact `"<field>,<direction>"` expression. When the
/// explicit orders are set they take precedence; when neither is set the sort is empty and
/// the driver's natural order applies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "SortRepr", into = "SortRepr")]
pub struct Sort {
    expression: Option<String>,
    orders: Option<Vec<Order>>,
}

impl Sort {
    /// Creates a sort from explicit orders, applied in sequence.
    pub fn new(orders: impl IntoIterator<Item = Order>) -> Self {
        Self { expression: None, orders: Some(orders.into_iter().collect()) }
    }

    /// Creates a sort from a compact `"<field>,<direction>"` expression.
    ///
    /// The expression is only parsed when the orders are requested, see [`Sort::parse`].
    pub fn from_expression(expression: impl Into<String>) -> Self {
        Self { expression: Some(expression.into()), orders: None }
    }

    /// Creates a sort ordering every field in `properties` by the same direction.
    pub fn by<I, P>(direction: Direction, properties: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self::new(Self::orders_by(direction, properties))
    }

    /// Builds one order per property, sharing `direction` and preserving input order.
    pub fn orders_by<I, P>(direction: Direction, properties: I) -> Vec<Order>
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        properties
            .into_iter()
            .map(|property| Order::new(property, direction))
            .collect()
    }

    /// Parses a compact `"<field>,<direction>"` expression.
    ///
    /// Returns no orders unless the expression has exactly two comma-separated parts and a
    /// non-empty field. Surrounding whitespace on either part is ignored. An empty or unknown
    /// direction falls back to [`Direction::DEFAULT`]. This never fails.
    ///
    /// ```ignore
    /// assert_eq!(Sort::parse("name,DESC"), vec![Order::desc("name")]);
    /// assert_eq!(Sort::parse("name,sideways"), vec![Order::asc("name")]);
    /// assert!(Sort::parse("name").is_empty());
    /// ```
    pub fn parse(expression: &str) -> Vec<Order> {
        let parts = expression.split(',').collect::<Vec<_>>();
        let [field, direction] = parts.as_slice() else {
            return Vec::new();
        };

        let field = field.trim();
        if field.is_empty() {
            return Vec::new();
        }

        vec![Order::new(field, Direction::parse_or_default(direction.trim()))]
    }

    /// Returns the compact expression this sort was built from, if any.
    pub fn expression(&self) -> Option<&str> {
        self.expression.as_deref()
    }

    /// Returns the orders of this sort, in the sequence they apply.
    pub fn orders(&self) -> Vec<Order> {
        match (&self.orders, &self.expression) {
            (Some(orders), _) => orders.clone(),
            (None, Some(expression)) => Self::parse(expression),
            (None, None) => Vec::new(),
        }
    }

    /// Returns `true` if this sort yields no orders.
    pub fn is_unsorted(&self) -> bool {
        self.orders().is_empty()
    }

    /// Renders this sort as a driver sort document, e.g. `{ "name": 1, "_id": -1 }`.
    ///
    /// The property `id` is mapped to the primary key field `_id`.
    pub fn to_document(&self) -> Document {
        self.orders()
            .into_iter()
            .map(|order| {
                let field = match order.property.as_str() {
                    "id" => PRIMARY_KEY.to_string(),
                    _ => order.property,
                };
                (field, Bson::Int32(order.direction.sort_value()))
            })
            .collect()
    }
}

impl From<Vec<Order>> for Sort {
    fn from(orders: Vec<Order>) -> Self {
        Sort::new(orders)
    }
}

impl From<&str> for Sort {
    fn from(expression: &str) -> Self {
        Sort::from_expression(expression)
    }
}

impl From<String> for Sort {
    fn from(expression: String) -> Self {
        Sort::from_expression(expression)
    }
}

/// Wire form of a [`Sort`]: the compact string or a list of orders.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SortRepr {
    Expression(String),
    Orders(Vec<Order>),
}

impl From<SortRepr> for Sort {
    fn from(repr: SortRepr) -> Self {
        match repr {
            SortRepr::Expression(expression) => Sort::from_expression(expression),
            SortRepr::Orders(orders) => Sort::new(orders),
        }
    }
}

impl From<Sort> for SortRepr {
    fn from(sort: Sort) -> Self {
        match sort {
            Sort { orders: Some(orders), .. } => SortRepr::Orders(orders),
            Sort { expression, .. } => SortRepr::Expression(expression.unwrap_or_default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn parses_field_and_direction() {
        assert_eq!(Sort::parse("field,desc"), vec![Order::desc("field")]);
        assert_eq!(Sort::parse("field,ASC"), vec![Order::asc("field")]);
        assert_eq!(Sort::parse("field,Desc"), vec![Order::desc("field")]);
    }

    #[test]
    fn unknown_or_empty_direction_falls_back_to_default() {
        assert_eq!(Sort::parse("field,bogus"), vec![Order::asc("field")]);
        assert_eq!(Sort::parse("field,"), vec![Order::asc("field")]);
    }

    #[test]
    fn malformed_expressions_yield_no_orders() {
        assert!(Sort::parse("").is_empty());
        assert!(Sort::parse("field").is_empty());
        assert!(Sort::parse(",desc").is_empty());
        assert!(Sort::parse("a,desc,extra").is_empty());
    }

    #[test]
    fn by_preserves_field_order() {
        let sort = Sort::by(Direction::Desc, ["b", "a", "c"]);
        let properties = sort
            .orders()
            .into_iter()
            .map(|order| order.property)
            .collect::<Vec<_>>();

        assert_eq!(properties, vec!["b", "a", "c"]);
        assert!(sort.orders().iter().all(|order| order.direction == Direction::Desc));
    }

    #[test]
    fn explicit_orders_take_precedence_over_expression() {
        let sort = Sort {
            expression: Some("name,desc".into()),
            orders: Some(vec![Order::asc("age")]),
        };
        assert_eq!(sort.orders(), vec![Order::asc("age")]);
    }

    #[test]
    fn empty_sort_is_unsorted() {
        assert!(Sort::default().is_unsorted());
        assert!(Sort::from_expression("nonsense").is_unsorted());
        assert!(Sort::default().to_document().is_empty());
    }

    #[test]
    fn to_document_maps_id_to_primary_key() {
        let sort = Sort::new([Order::desc("id"), Order::asc("name")]);
        assert_eq!(sort.to_document(), doc! { "_id": -1, "name": 1 });
    }

    #[test]
    fn deserializes_from_expression_or_orders() {
        let compact: Sort = serde_json::from_str(r#""name,desc""#).unwrap();
        assert_eq!(compact.orders(), vec![Order::desc("name")]);

        let explicit: Sort =
            serde_json::from_str(r#"[{"property":"age","direction":"DESC"},{"property":"name"}]"#)
                .unwrap();
        assert_eq!(explicit.orders(), vec![Order::desc("age"), Order::asc("name")]);
    }

    #[test]
    fn serializes_in_the_shape_it_was_built_from() {
        assert_eq!(
            serde_json::to_string(&Sort::from_expression("name,desc")).unwrap(),
            r#""name,desc""#
        );
        assert_eq!(
            serde_json::to_string(&Sort::new([Order::desc("age")])).unwrap(),
            r#"[{"property":"age","direction":"desc"}]"#
        );
    }
}
