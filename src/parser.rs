//! Text-form parsers using nom.
//!
//! The query builder UI produces structured specs directly; these parsers
//! cover the compact forms typed on the command line and the text schema
//! format.
//!
//! ```text
//! customers.name                          column
//! orders.total >= 10                      filter
//! customers.name ILIKE %ann%              filter
//! orders.shipped_at IS NULL               filter
//! customers.name desc                     order term
//! sum(orders.total)                       aggregate
//! public.customers.id = public.orders.customer_id left
//!                                         explicit join
//! margin = orders.total - orders.cost     calculated column
//! ```

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::{char, multispace0, multispace1, not_line_ending},
    combinator::{map, map_opt, opt, recognize, rest, value},
    multi::{many0, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
};

use crate::ast::*;
use crate::error::{QspecError, QspecResult};
use crate::schema::{Column, ColumnRef, Relation, Schema};

/// Parse a relation identifier: `schema.table` or `table`.
pub fn parse_relation_id(input: &str) -> QspecResult<RelationId> {
    finish(input, relation_id(input.trim()))
}

/// Parse a column identifier: `table.column` or `schema.table.column`.
pub fn parse_column_id(input: &str) -> QspecResult<ColumnId> {
    finish(input, column_id(input.trim()))
}

/// Parse a filter: `column <op> value`.
pub fn parse_filter(input: &str) -> QspecResult<Filter> {
    finish(input, filter(input.trim()))
}

/// Parse an order term: `column [asc|desc]`.
pub fn parse_order(input: &str) -> QspecResult<OrderBy> {
    finish(input, order_term(input.trim()))
}

/// Parse an aggregate term: `func(column)`.
pub fn parse_aggregate(input: &str) -> QspecResult<(ColumnId, AggregateFunc)> {
    finish(input, aggregate_term(input.trim()))
}

/// Parse an explicit join: `rel.col = rel.col [inner|left|right|full]`.
pub fn parse_join(input: &str) -> QspecResult<ExplicitJoin> {
    finish(input, explicit_join(input.trim()))
}

/// Parse a calculated column: `alias = expression`.
pub fn parse_calculated(input: &str) -> QspecResult<CalculatedColumn> {
    finish(input, calculated(input.trim()))
}

/// Parse the text schema format (one or more `table` blocks).
pub fn parse_schema(input: &str) -> QspecResult<Schema> {
    finish(input, schema_text(input))
}

fn finish<'a, T>(input: &'a str, result: IResult<&'a str, T>) -> QspecResult<T> {
    let input = input.trim();
    match result {
        Ok((remaining, out)) if remaining.trim().is_empty() => Ok(out),
        Ok((remaining, _)) => Err(QspecError::parse(
            input.len().saturating_sub(remaining.len()),
            format!("Unexpected trailing content: '{}'", remaining.trim()),
        )),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(QspecError::parse(
            input.len().saturating_sub(e.input.len()),
            format!("Parse failed near '{}'", e.input),
        )),
        Err(nom::Err::Incomplete(_)) => Err(QspecError::parse(input.len(), "Incomplete input")),
    }
}

/// Whitespace and `--` line comments.
fn sp(input: &str) -> IResult<&str, ()> {
    value(
        (),
        many0(alt((
            multispace1,
            recognize(pair(tag("--"), not_line_ending)),
        ))),
    )(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_')(input)
}

fn dotted(input: &str) -> IResult<&str, Vec<&str>> {
    separated_list1(char('.'), identifier)(input)
}

fn relation_id(input: &str) -> IResult<&str, RelationId> {
    map_opt(dotted, |parts| match parts.as_slice() {
        [table] => Some(RelationId::new(DEFAULT_SCHEMA, *table)),
        [schema, table] => Some(RelationId::new(*schema, *table)),
        _ => None,
    })(input)
}

fn column_id(input: &str) -> IResult<&str, ColumnId> {
    map_opt(dotted, |parts| match parts.as_slice() {
        [table, column] | [_, table, column] => Some(ColumnId::new(*table, *column)),
        _ => None,
    })(input)
}

/// `schema.table.column` or `table.column`, for join endpoints and references.
fn column_ref(input: &str) -> IResult<&str, ColumnRef> {
    map_opt(dotted, |parts| match parts.as_slice() {
        [table, column] => Some(ColumnRef::new(DEFAULT_SCHEMA, *table, *column)),
        [schema, table, column] => Some(ColumnRef::new(*schema, *table, *column)),
        _ => None,
    })(input)
}

fn operator(input: &str) -> IResult<&str, Operator> {
    alt((
        value(
            Operator::IsNotNull,
            tuple((
                tag_no_case("IS"),
                multispace1,
                tag_no_case("NOT"),
                multispace1,
                tag_no_case("NULL"),
            )),
        ),
        value(
            Operator::IsNull,
            tuple((tag_no_case("IS"), multispace1, tag_no_case("NULL"))),
        ),
        value(Operator::Gte, tag(">=")),
        value(Operator::Lte, tag("<=")),
        value(Operator::Ne, tag("!=")),
        value(Operator::Ne, tag("<>")),
        value(Operator::Eq, char('=')),
        value(Operator::Gt, char('>')),
        value(Operator::Lt, char('<')),
        value(Operator::ILike, tag_no_case("ILIKE")),
        value(Operator::Like, tag_no_case("LIKE")),
        value(Operator::In, tag_no_case("IN")),
    ))(input)
}

/// Strip one pair of surrounding single quotes.
fn unquote(raw: &str) -> String {
    let raw = raw.trim();
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        raw[1..raw.len() - 1].to_string()
    } else {
        raw.to_string()
    }
}

fn filter(input: &str) -> IResult<&str, Filter> {
    let (input, column) = column_id(input)?;
    let (input, _) = multispace0(input)?;
    let (input, op) = operator(input)?;

    let (input, value) = if op.is_unary() {
        (input, String::new())
    } else {
        let (input, _) = multispace0(input)?;
        let (input, raw) = rest(input)?;
        if raw.trim().is_empty() {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Eof,
            )));
        }
        let value = if op == Operator::In {
            raw.trim().to_string()
        } else {
            unquote(raw)
        };
        (input, value)
    };

    Ok((input, Filter { column, op, value }))
}

fn sort_order(input: &str) -> IResult<&str, SortOrder> {
    alt((
        value(SortOrder::Desc, tag_no_case("desc")),
        value(SortOrder::Asc, tag_no_case("asc")),
    ))(input)
}

fn order_term(input: &str) -> IResult<&str, OrderBy> {
    let (input, column) = column_id(input)?;
    let (input, direction) = opt(preceded(multispace1, sort_order))(input)?;
    Ok((
        input,
        OrderBy {
            column,
            direction: direction.unwrap_or_default(),
        },
    ))
}

fn aggregate_func(input: &str) -> IResult<&str, AggregateFunc> {
    alt((
        value(AggregateFunc::Count, tag_no_case("count")),
        value(AggregateFunc::Sum, tag_no_case("sum")),
        value(AggregateFunc::Avg, tag_no_case("avg")),
        value(AggregateFunc::Min, tag_no_case("min")),
        value(AggregateFunc::Max, tag_no_case("max")),
        value(AggregateFunc::None, tag_no_case("none")),
    ))(input)
}

fn aggregate_term(input: &str) -> IResult<&str, (ColumnId, AggregateFunc)> {
    let (input, func) = aggregate_func(input)?;
    let (input, column) = delimited(
        pair(multispace0, char('(')),
        delimited(multispace0, column_id, multispace0),
        char(')'),
    )(input)?;
    Ok((input, (column, func)))
}

fn join_kind(input: &str) -> IResult<&str, JoinKind> {
    alt((
        value(JoinKind::Inner, tag_no_case("inner")),
        value(JoinKind::Left, tag_no_case("left")),
        value(JoinKind::Right, tag_no_case("right")),
        value(JoinKind::Full, tag_no_case("full")),
    ))(input)
}

fn explicit_join(input: &str) -> IResult<&str, ExplicitJoin> {
    let (input, from) = column_ref(input)?;
    let (input, _) = delimited(multispace0, char('='), multispace0)(input)?;
    let (input, to) = column_ref(input)?;
    let (input, kind) = opt(preceded(multispace1, join_kind))(input)?;

    Ok((
        input,
        ExplicitJoin {
            from: RelationId::new(from.schema, from.table),
            from_column: from.column,
            to: RelationId::new(to.schema, to.table),
            to_column: to.column,
            kind: kind.unwrap_or(JoinKind::Inner),
        },
    ))
}

fn calculated(input: &str) -> IResult<&str, CalculatedColumn> {
    let (input, alias) = identifier(input)?;
    let (input, _) = delimited(multispace0, char('='), multispace0)(input)?;
    let (input, expression) = take_while1(|_: char| true)(input)?;
    Ok((
        input,
        CalculatedColumn {
            alias: alias.to_string(),
            expression: expression.trim().to_string(),
        },
    ))
}

#[derive(Clone)]
enum Modifier {
    PrimaryKey,
    References(ColumnRef),
    Ignored,
}

fn column_type(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '[' || c == ']'),
        opt(delimited(char('('), take_while(|c| c != ')'), char(')'))),
    ))(input)
}

fn modifier(input: &str) -> IResult<&str, Modifier> {
    alt((
        value(
            Modifier::PrimaryKey,
            tuple((tag_no_case("primary"), multispace1, tag_no_case("key"))),
        ),
        value(Modifier::PrimaryKey, tag_no_case("pk")),
        map(
            preceded(
                pair(alt((tag("->"), tag_no_case("references"))), multispace0),
                column_ref,
            ),
            Modifier::References,
        ),
        value(
            Modifier::Ignored,
            tuple((tag_no_case("not"), multispace1, tag_no_case("null"))),
        ),
        value(Modifier::Ignored, tag_no_case("null")),
    ))(input)
}

fn column_def(input: &str) -> IResult<&str, Column> {
    let (input, name) = identifier(input)?;
    let (input, _) = multispace1(input)?;
    let (input, typ) = column_type(input)?;
    let (input, modifiers) = many0(preceded(multispace1, modifier))(input)?;

    let mut column = Column::new(name, typ);
    for m in modifiers {
        match m {
            Modifier::PrimaryKey => column.primary_key = true,
            Modifier::References(target) => column.references = Some(target),
            Modifier::Ignored => {}
        }
    }
    Ok((input, column))
}

fn relation_block(input: &str) -> IResult<&str, Relation> {
    let (input, _) = tag_no_case("table")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, id) = relation_id(input)?;
    let (input, _) = sp(input)?;
    let (input, _) = char('(')(input)?;
    let (input, _) = sp(input)?;
    let (input, columns) = separated_list0(delimited(sp, char(','), sp), column_def)(input)?;
    let (input, _) = sp(input)?;
    let (input, _) = opt(char(','))(input)?;
    let (input, _) = sp(input)?;
    let (input, _) = char(')')(input)?;

    let mut relation = Relation::new(id.schema, id.table);
    relation.columns = columns;
    Ok((input, relation))
}

fn schema_text(input: &str) -> IResult<&str, Schema> {
    let (input, _) = sp(input)?;
    let (input, relations) = many0(terminated(relation_block, sp))(input)?;
    Ok((input, Schema { relations }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_id() {
        assert_eq!(
            parse_column_id("customers.name").unwrap(),
            ColumnId::new("customers", "name")
        );
        assert_eq!(
            parse_column_id("public.customers.name").unwrap(),
            ColumnId::new("customers", "name")
        );
        assert!(parse_column_id("name").is_err());
        assert!(parse_column_id("a.b.c.d").is_err());
    }

    #[test]
    fn test_relation_id() {
        assert_eq!(
            parse_relation_id("sales.orders").unwrap(),
            RelationId::new("sales", "orders")
        );
        assert_eq!(
            parse_relation_id("orders").unwrap(),
            RelationId::new("public", "orders")
        );
    }

    #[test]
    fn test_filter_comparisons() {
        let f = parse_filter("orders.total>=10").unwrap();
        assert_eq!(f.column, ColumnId::new("orders", "total"));
        assert_eq!(f.op, Operator::Gte);
        assert_eq!(f.value, "10");

        let f = parse_filter("customers.name = 'Ann Lee'").unwrap();
        assert_eq!(f.op, Operator::Eq);
        assert_eq!(f.value, "Ann Lee");

        let f = parse_filter("orders.status <> open").unwrap();
        assert_eq!(f.op, Operator::Ne);
        assert_eq!(f.value, "open");
    }

    #[test]
    fn test_filter_keywords() {
        let f = parse_filter("customers.name ilike %ann%").unwrap();
        assert_eq!(f.op, Operator::ILike);
        assert_eq!(f.value, "%ann%");

        let f = parse_filter("orders.id IN (1, 2, 3)").unwrap();
        assert_eq!(f.op, Operator::In);
        assert_eq!(f.value, "(1, 2, 3)");

        let f = parse_filter("orders.shipped_at IS NOT NULL").unwrap();
        assert_eq!(f.op, Operator::IsNotNull);
        assert!(f.value.is_empty());

        let f = parse_filter("orders.shipped_at is null").unwrap();
        assert_eq!(f.op, Operator::IsNull);

        assert!(parse_filter("orders.total >=").is_err());
        assert!(parse_filter("orders.total IS NULL junk").is_err());
    }

    #[test]
    fn test_order_term() {
        let o = parse_order("customers.name desc").unwrap();
        assert_eq!(o.direction, SortOrder::Desc);
        let o = parse_order("customers.name").unwrap();
        assert_eq!(o.direction, SortOrder::Asc);
    }

    #[test]
    fn test_aggregate_term() {
        let (col, func) = parse_aggregate("SUM( orders.total )").unwrap();
        assert_eq!(col, ColumnId::new("orders", "total"));
        assert_eq!(func, AggregateFunc::Sum);
        assert!(parse_aggregate("median(orders.total)").is_err());
    }

    #[test]
    fn test_explicit_join() {
        let j = parse_join("public.customers.id = sales.orders.buyer_id left").unwrap();
        assert_eq!(j.from, RelationId::new("public", "customers"));
        assert_eq!(j.from_column, "id");
        assert_eq!(j.to, RelationId::new("sales", "orders"));
        assert_eq!(j.to_column, "buyer_id");
        assert_eq!(j.kind, JoinKind::Left);

        let j = parse_join("customers.id=orders.customer_id").unwrap();
        assert_eq!(j.kind, JoinKind::Inner);
        assert_eq!(j.to, RelationId::new("public", "orders"));
    }

    #[test]
    fn test_calculated() {
        let c = parse_calculated("margin = orders.total - orders.cost").unwrap();
        assert_eq!(c.alias, "margin");
        assert_eq!(c.expression, "orders.total - orders.cost");
    }

    #[test]
    fn test_schema_text() {
        let text = r#"
            -- storefront
            table public.customers (
                id int pk,
                name text not null
            )

            table orders (
                id int primary key,
                customer_id int -> public.customers.id, -- owner
                total numeric(10,2),
            )
        "#;
        let schema = parse_schema(text).unwrap();
        assert_eq!(schema.relations.len(), 2);

        let customers = &schema.relations[0];
        assert_eq!(customers.id(), RelationId::new("public", "customers"));
        assert!(customers.columns[0].primary_key);
        assert_eq!(customers.columns[1].typ, "text");

        let orders = &schema.relations[1];
        assert_eq!(orders.columns.len(), 3);
        assert!(orders.columns[0].primary_key);
        assert_eq!(
            orders.columns[1].references,
            Some(ColumnRef::new("public", "customers", "id"))
        );
        assert_eq!(orders.columns[2].typ, "numeric(10,2)");
    }

    #[test]
    fn test_schema_text_error() {
        let err = parse_schema("table users ( id int pk").unwrap_err();
        assert!(matches!(err, QspecError::Parse { .. }));
    }
}
