//! Segment builders for tests. Spans are looked up in the SQL text, so every
//! segment points at the text it stands for.

use data_panel_common::statement::*;

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn is_word(needle: &str) -> bool {
    !needle.is_empty() && needle.chars().all(is_identifier_char)
}

/// Byte offset of the `nth` occurrence of `needle` at or after `from`; words
/// only match on word boundaries.
fn find_at(sql: &str, needle: &str, nth: usize, from: usize) -> usize {
    let word = is_word(needle);
    let mut seen = 0;
    let mut offset = from;
    while let Some(found) = sql[offset..].find(needle) {
        let start = offset + found;
        let stop = start + needle.len();
        let before_ok = !word || sql[..start].chars().last().map_or(true, |c| !is_identifier_char(c));
        let after_ok = !word || sql[stop..].chars().next().map_or(true, |c| !is_identifier_char(c));
        if before_ok && after_ok {
            if seen == nth {
                return start;
            }
            seen += 1;
        }
        offset = start + 1;
    }
    panic!("`{}` #{} not found in `{}`", needle, nth, sql)
}

pub fn span_at(sql: &str, needle: &str, nth: usize) -> Span {
    let start = find_at(sql, needle, nth, 0);
    Span::new(start, start + needle.len() - 1)
}

pub fn span_of(sql: &str, needle: &str) -> Span {
    span_at(sql, needle, 0)
}

fn span_after(sql: &str, needle: &str, from: usize) -> Span {
    let start = find_at(sql, needle, 0, from);
    Span::new(start, start + needle.len() - 1)
}

fn join_spans(left: Span, right: Span) -> Span {
    Span::new(left.start.min(right.start), left.stop.max(right.stop))
}

// columns and expressions

pub fn column_segment_at(sql: &str, text: &str, nth: usize) -> ColumnSegment {
    let span = span_at(sql, text, nth);
    match text.rfind('.') {
        Some(dot) => {
            let owner = &text[..dot];
            ColumnSegment::new(span, &text[dot + 1..])
                .with_owner(OwnerSegment::new(Span::new(span.start, span.start + owner.len() - 1), owner))
        }
        None => ColumnSegment::new(span, text),
    }
}

pub fn column_segment(sql: &str, text: &str) -> ColumnSegment {
    column_segment_at(sql, text, 0)
}

pub fn column_at(sql: &str, text: &str, nth: usize) -> ExpressionSegment {
    ExpressionSegment::Column(column_segment_at(sql, text, nth))
}

pub fn column(sql: &str, text: &str) -> ExpressionSegment {
    column_at(sql, text, 0)
}

pub fn owned_column_at(sql: &str, text: &str, nth: usize) -> ExpressionSegment {
    column_at(sql, text, nth)
}

pub fn owned_column(sql: &str, text: &str) -> ExpressionSegment {
    column_at(sql, text, 0)
}

pub fn literal(sql: &str, text: &str, value: Value) -> ExpressionSegment {
    literal_at(sql, text, 0, value)
}

pub fn literal_at(sql: &str, text: &str, nth: usize, value: Value) -> ExpressionSegment {
    ExpressionSegment::Literal(LiteralExpressionSegment {
        span: span_at(sql, text, nth),
        value,
    })
}

/// The `nth` `?` of the text, bound to parameter `nth`.
pub fn marker(sql: &str, nth: usize) -> ExpressionSegment {
    ExpressionSegment::ParameterMarker(ParameterMarkerExpressionSegment {
        span: span_at(sql, "?", nth),
        index: nth,
        marker_type: ParameterMarkerType::Question,
    })
}

/// `$<index + 1>`, bound to parameter `index`.
pub fn dollar_marker(sql: &str, index: usize) -> ExpressionSegment {
    ExpressionSegment::ParameterMarker(ParameterMarkerExpressionSegment {
        span: span_of(sql, &format!("${}", index + 1)),
        index,
        marker_type: ParameterMarkerType::Dollar,
    })
}

pub fn binary(left: ExpressionSegment, right: ExpressionSegment, operator: &str) -> ExpressionSegment {
    let span = join_spans(left.span(), right.span());
    ExpressionSegment::BinaryOperation(BinaryOperationExpression {
        span,
        left: Box::new(left),
        right: Box::new(right),
        operator: operator.to_string(),
        text: String::new(),
    })
}

pub fn eq(left: ExpressionSegment, right: ExpressionSegment) -> ExpressionSegment {
    binary(left, right, "=")
}

pub fn and(left: ExpressionSegment, right: ExpressionSegment) -> ExpressionSegment {
    binary(left, right, "AND")
}

pub fn or(left: ExpressionSegment, right: ExpressionSegment) -> ExpressionSegment {
    binary(left, right, "OR")
}

pub fn row(items: Vec<ExpressionSegment>) -> ExpressionSegment {
    let span = items_span(&items);
    ExpressionSegment::Row(RowExpression { span, items })
}

fn items_span(items: &[ExpressionSegment]) -> Span {
    match (items.first(), items.last()) {
        (Some(first), Some(last)) => Span::new(first.span().start.saturating_sub(1), last.span().stop + 1),
        _ => Span::default(),
    }
}

pub fn in_list(left: ExpressionSegment, items: Vec<ExpressionSegment>) -> ExpressionSegment {
    let list_span = items_span(&items);
    let span = join_spans(left.span(), list_span);
    ExpressionSegment::In(InExpression {
        span,
        left: Box::new(left),
        right: Box::new(ExpressionSegment::List(ListExpression { span: list_span, items })),
        not: false,
    })
}

pub fn in_subquery(left: ExpressionSegment, subquery: SubquerySegment) -> ExpressionSegment {
    let span = join_spans(left.span(), subquery.span);
    ExpressionSegment::In(InExpression {
        span,
        left: Box::new(left),
        right: Box::new(ExpressionSegment::Subquery(SubqueryExpressionSegment { subquery })),
        not: false,
    })
}

pub fn between(left: ExpressionSegment, low: ExpressionSegment, high: ExpressionSegment) -> ExpressionSegment {
    let span = join_spans(left.span(), high.span());
    ExpressionSegment::Between(BetweenExpression {
        span,
        left: Box::new(left),
        between: Box::new(low),
        and: Box::new(high),
        not: false,
    })
}

/// `i.id(+)`
pub fn outer_join(sql: &str, text: &str) -> ExpressionSegment {
    let column = column_segment(sql, text);
    let span = Span::new(column.span.start, column.span.stop + 3);
    ExpressionSegment::OuterJoin(OuterJoinExpression {
        span,
        column,
        join_operator: "(+)".to_string(),
    })
}

/// Subquery whose body starts with `needle`; the span runs from the opening
/// parenthesis in front of it to the matching closing one.
pub fn subquery(sql: &str, needle: &str, select: SelectStatement) -> SubquerySegment {
    let body = find_at(sql, needle, 0, 0);
    let start = sql[..body].rfind('(').unwrap_or(body);
    let mut depth = 0;
    let mut stop = sql.len() - 1;
    for (offset, c) in sql[start..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    stop = start + offset;
                    break;
                }
            }
            _ => {}
        }
    }
    SubquerySegment {
        span: Span::new(start, stop),
        select: Box::new(select),
    }
}

pub fn exists(sql: &str, needle: &str, select: SelectStatement) -> ExpressionSegment {
    let subquery = subquery(sql, needle, select);
    let start = find_at(sql, "EXISTS", 0, 0);
    ExpressionSegment::Exists(ExistsSubqueryExpression {
        span: Span::new(start, subquery.span.stop),
        subquery,
        not: false,
    })
}

// tables

pub fn simple_table_at(sql: &str, name: &str, nth: usize) -> SimpleTableSegment {
    SimpleTableSegment::new(span_at(sql, name, nth), name)
}

pub fn table_at(sql: &str, name: &str, nth: usize) -> TableSegment {
    TableSegment::Simple(simple_table_at(sql, name, nth))
}

pub fn table(sql: &str, name: &str) -> TableSegment {
    table_at(sql, name, 0)
}

pub fn aliased_table_at(sql: &str, name: &str, nth: usize, alias: &str) -> TableSegment {
    let table = simple_table_at(sql, name, nth);
    let alias_span = span_after(sql, alias, table.table_name.span.stop + 1);
    TableSegment::Simple(table.with_alias(AliasSegment::new(alias_span, alias)))
}

pub fn aliased_table(sql: &str, name: &str, alias: &str) -> TableSegment {
    aliased_table_at(sql, name, 0, alias)
}

/// `owner.name [alias]`
pub fn qualified_table(sql: &str, owner: &str, name: &str, alias: Option<&str>) -> TableSegment {
    let qualified = span_of(sql, &format!("{}.{}", owner, name));
    let owner_span = Span::new(qualified.start, qualified.start + owner.len() - 1);
    let name_span = Span::new(owner_span.stop + 2, qualified.stop);
    let mut table = SimpleTableSegment::new(name_span, name).with_owner(OwnerSegment::new(owner_span, owner));
    if let Some(alias) = alias {
        let alias_span = span_after(sql, alias, qualified.stop + 1);
        table = table.with_alias(AliasSegment::new(alias_span, alias));
    }
    TableSegment::Simple(table)
}

fn join(left: TableSegment, right: TableSegment, join_type: JoinType, condition: Option<ExpressionSegment>) -> TableSegment {
    let mut span = join_spans(left.span(), right.span());
    if let Some(condition) = &condition {
        span = join_spans(span, condition.span());
    }
    TableSegment::Join(Box::new(JoinTableSegment {
        span,
        left,
        right,
        join_type,
        natural: false,
        condition,
        using: vec![],
        derived_using: vec![],
    }))
}

pub fn join_on(left: TableSegment, right: TableSegment, condition: ExpressionSegment) -> TableSegment {
    join(left, right, JoinType::Inner, Some(condition))
}

pub fn join_using(left: TableSegment, right: TableSegment, using: Vec<ColumnSegment>) -> TableSegment {
    let mut result = join(left, right, JoinType::Inner, None);
    if let TableSegment::Join(join) = &mut result {
        join.using = using;
    }
    result
}

pub fn comma_join(left: TableSegment, right: TableSegment) -> TableSegment {
    join(left, right, JoinType::Comma, None)
}

pub fn subquery_table(sql: &str, needle: &str, select: SelectStatement, alias: &str) -> TableSegment {
    let subquery = subquery(sql, needle, select);
    let alias_span = span_after(sql, alias, subquery.span.stop + 1);
    TableSegment::Subquery(Box::new(SubqueryTableSegment {
        subquery,
        alias: Some(AliasSegment::new(alias_span, alias)),
    }))
}

pub fn cte(sql: &str, alias: &str, needle: &str, body: SelectStatement) -> CommonTableExpressionSegment {
    let alias_span = span_of(sql, alias);
    let subquery = subquery(sql, needle, body);
    CommonTableExpressionSegment {
        span: Span::new(alias_span.start, subquery.span.stop),
        alias: AliasSegment::new(alias_span, alias),
        columns: vec![],
        subquery,
    }
}

// projections

pub fn star(sql: &str) -> ProjectionSegment {
    ProjectionSegment::Shorthand(ShorthandProjectionSegment {
        span: span_of(sql, "*"),
        owner: None,
    })
}

/// `o.*`
pub fn owned_star(sql: &str, text: &str) -> ProjectionSegment {
    let span = span_of(sql, text);
    let owner = &text[..text.len() - 2];
    ProjectionSegment::Shorthand(ShorthandProjectionSegment {
        span,
        owner: Some(OwnerSegment::new(Span::new(span.start, span.start + owner.len() - 1), owner)),
    })
}

pub fn column_projection_at(sql: &str, text: &str, nth: usize) -> ProjectionSegment {
    ProjectionSegment::Column(ColumnProjectionSegment {
        column: column_segment_at(sql, text, nth),
        alias: None,
    })
}

pub fn column_projection(sql: &str, text: &str) -> ProjectionSegment {
    column_projection_at(sql, text, 0)
}

pub fn aliased_column_projection(sql: &str, text: &str, alias: &str) -> ProjectionSegment {
    let column = column_segment(sql, text);
    let alias_span = span_after(sql, alias, column.span.stop + 1);
    ProjectionSegment::Column(ColumnProjectionSegment {
        column,
        alias: Some(AliasSegment::new(alias_span, alias)),
    })
}

fn aggregation_with(
    sql: &str,
    text: &str,
    aggregation_type: AggregationType,
    parameters: Vec<ExpressionSegment>,
    distinct: bool,
) -> ProjectionSegment {
    let open = text.find('(').unwrap_or(0);
    let close = text.rfind(')').unwrap_or(text.len());
    ProjectionSegment::Aggregation(AggregationProjectionSegment {
        span: span_of(sql, text),
        aggregation_type,
        distinct,
        parameters,
        inner_expression: text[open + 1..close].to_string(),
        alias: None,
    })
}

pub fn aggregation(
    sql: &str,
    text: &str,
    aggregation_type: AggregationType,
    parameters: Vec<ExpressionSegment>,
) -> ProjectionSegment {
    aggregation_with(sql, text, aggregation_type, parameters, false)
}

pub fn distinct_aggregation(
    sql: &str,
    text: &str,
    aggregation_type: AggregationType,
    parameters: Vec<ExpressionSegment>,
) -> ProjectionSegment {
    aggregation_with(sql, text, aggregation_type, parameters, true)
}

/// Puts the `nth` occurrence of `alias` on a projection.
pub fn aliased(projection: ProjectionSegment, sql: &str, alias: &str, nth: usize) -> ProjectionSegment {
    let alias = Some(AliasSegment::new(span_at(sql, alias, nth), alias));
    match projection {
        ProjectionSegment::Column(mut p) => {
            p.alias = alias;
            ProjectionSegment::Column(p)
        }
        ProjectionSegment::Aggregation(mut p) => {
            p.alias = alias;
            ProjectionSegment::Aggregation(p)
        }
        ProjectionSegment::Expression(mut p) => {
            p.alias = alias;
            ProjectionSegment::Expression(p)
        }
        ProjectionSegment::Subquery(mut p) => {
            p.alias = alias;
            ProjectionSegment::Subquery(p)
        }
        shorthand => shorthand,
    }
}

pub fn subquery_projection(sql: &str, needle: &str, select: SelectStatement) -> ProjectionSegment {
    let subquery = subquery(sql, needle, select);
    let text = sql[subquery.span.start..=subquery.span.stop].to_string();
    ProjectionSegment::Subquery(SubqueryProjectionSegment {
        span: subquery.span,
        subquery,
        text,
        alias: None,
    })
}

pub fn projections_segment(_sql: &str, projections: Vec<ProjectionSegment>) -> ProjectionsSegment {
    let span = match (projections.first(), projections.last()) {
        (Some(first), Some(last)) => Span::new(first.span().start, last.span().stop),
        _ => Span::default(),
    };
    ProjectionsSegment {
        span,
        distinct_row: false,
        projections,
    }
}

// order by / group by

pub fn column_item_at(sql: &str, text: &str, nth: usize) -> OrderByItemSegment {
    OrderByItemSegment::column(column_segment_at(sql, text, nth), OrderDirection::Asc)
}

pub fn column_item(sql: &str, text: &str) -> OrderByItemSegment {
    column_item_at(sql, text, 0)
}

pub fn index_item(sql: &str, text: &str, index: usize) -> OrderByItemSegment {
    OrderByItemSegment::index(span_of(sql, text), index, OrderDirection::Asc)
}

// statements

pub fn select(projections: Vec<ProjectionSegment>, from: TableSegment) -> SelectStatement {
    SelectStatement {
        projections: projections_segment("", projections),
        from: Some(from),
        ..SelectStatement::default()
    }
}

pub trait SelectExt {
    fn with_where(self, expr: ExpressionSegment) -> Self;
    fn with_group_by(self, items: Vec<OrderByItemSegment>) -> Self;
    fn with_having(self, expr: ExpressionSegment) -> Self;
    fn with_order_by(self, items: Vec<OrderByItemSegment>) -> Self;
    fn with_limit(self, limit: LimitSegment) -> Self;
    fn with_cte(self, cte: CommonTableExpressionSegment) -> Self;
    fn with_lock(self, sql: &str, text: &str) -> Self;
    fn with_distinct_row(self) -> Self;
}

fn items_range(items: &[OrderByItemSegment]) -> Span {
    match (items.first(), items.last()) {
        (Some(first), Some(last)) => Span::new(first.span.start, last.span.stop),
        _ => Span::default(),
    }
}

impl SelectExt for SelectStatement {
    fn with_where(mut self, expr: ExpressionSegment) -> Self {
        self.where_segment = Some(WhereSegment { span: expr.span(), expr });
        self
    }

    fn with_group_by(mut self, items: Vec<OrderByItemSegment>) -> Self {
        self.group_by = Some(GroupBySegment {
            span: items_range(&items),
            items,
        });
        self
    }

    fn with_having(mut self, expr: ExpressionSegment) -> Self {
        self.having = Some(HavingSegment { span: expr.span(), expr });
        self
    }

    fn with_order_by(mut self, items: Vec<OrderByItemSegment>) -> Self {
        self.order_by = Some(OrderBySegment {
            span: items_range(&items),
            items,
        });
        self
    }

    fn with_limit(mut self, limit: LimitSegment) -> Self {
        self.limit = Some(limit);
        self
    }

    fn with_cte(mut self, cte: CommonTableExpressionSegment) -> Self {
        match &mut self.with {
            Some(with) => {
                with.span = join_spans(with.span, cte.span);
                with.common_table_expressions.push(cte);
            }
            None => {
                self.with = Some(WithSegment {
                    span: cte.span,
                    common_table_expressions: vec![cte],
                    recursive: false,
                })
            }
        }
        self
    }

    fn with_lock(mut self, sql: &str, text: &str) -> Self {
        self.lock = Some(LockSegment { span: span_of(sql, text) });
        self
    }

    fn with_distinct_row(mut self) -> Self {
        self.projections.distinct_row = true;
        self
    }
}

fn simple(table: TableSegment) -> SimpleTableSegment {
    match table {
        TableSegment::Simple(simple) => simple,
        other => panic!("not a simple table: {:?}", other),
    }
}

pub fn assignment(sql: &str, column_name: &str, value: ExpressionSegment) -> AssignmentSegment {
    let column = column_segment(sql, column_name);
    AssignmentSegment {
        span: join_spans(column.span, value.span()),
        columns: vec![column],
        value,
    }
}

fn set_assignment(assignments: Vec<AssignmentSegment>) -> SetAssignmentSegment {
    let span = match (assignments.first(), assignments.last()) {
        (Some(first), Some(last)) => Span::new(first.span.start, last.span.stop),
        _ => Span::default(),
    };
    SetAssignmentSegment { span, assignments }
}

pub fn update(table: TableSegment, assignments: Vec<AssignmentSegment>, condition: Option<ExpressionSegment>) -> UpdateStatement {
    UpdateStatement {
        table,
        set_assignment: set_assignment(assignments),
        where_segment: condition.map(|expr| WhereSegment { span: expr.span(), expr }),
        order_by: None,
        limit: None,
    }
}

pub fn delete(table: TableSegment, condition: Option<ExpressionSegment>) -> DeleteStatement {
    DeleteStatement {
        table,
        where_segment: condition.map(|expr| WhereSegment { span: expr.span(), expr }),
        order_by: None,
        limit: None,
    }
}

pub fn values_row(sql: &str, text: &str, values: Vec<ExpressionSegment>) -> InsertValuesSegment {
    values_row_at(sql, text, 0, values)
}

pub fn values_row_at(sql: &str, text: &str, nth: usize, values: Vec<ExpressionSegment>) -> InsertValuesSegment {
    InsertValuesSegment {
        span: span_at(sql, text, nth),
        values,
    }
}

/// `INSERT INTO table (columns...) VALUES rows...`; an empty column list
/// leaves the columns to the catalog.
pub fn insert(table: TableSegment, sql: &str, columns: &[&str], rows: Vec<InsertValuesSegment>) -> InsertStatement {
    let table = simple(table);
    let columns: Vec<ColumnSegment> = columns.iter().map(|name| column_segment(sql, name)).collect();
    let columns_span = match (columns.first(), columns.last()) {
        (Some(first), Some(last)) => Some(Span::new(first.span.start - 1, last.span.stop + 1)),
        _ => None,
    };
    InsertStatement {
        table,
        columns_span,
        columns,
        values: rows,
        insert_select: None,
        set_assignment: None,
    }
}

pub fn insert_set(table: TableSegment, _sql: &str, assignments: Vec<AssignmentSegment>) -> InsertStatement {
    InsertStatement {
        table: simple(table),
        columns_span: None,
        columns: vec![],
        values: vec![],
        insert_select: None,
        set_assignment: Some(set_assignment(assignments)),
    }
}

pub fn create_table(sql: &str, name: &str) -> CreateTableStatement {
    CreateTableStatement {
        table: simple_table_at(sql, name, 0),
        if_not_exists: false,
        column_definitions: vec![],
    }
}

// ---------------------
//  RULES
// ---------------------

pub const ORDER_SHARDING_YAML: &str = r#"
sharding:
  tables:
    t_order:
      actual_data_nodes: ["ds_${0..1}.t_order_${0..1}"]
      database_strategy: { sharding_column: user_id, algorithm_name: db_mod }
      table_strategy: { sharding_column: order_id, algorithm_name: t_order_inline }
    t_order_item:
      actual_data_nodes: ["ds_${0..1}.t_order_item_${0..1}"]
      database_strategy: { sharding_column: user_id, algorithm_name: db_mod }
      table_strategy: { sharding_column: order_id, algorithm_name: t_order_item_inline }
    t_user:
      actual_data_nodes: ["ds_${0..1}.t_user"]
      database_strategy: { sharding_column: user_id, algorithm_name: db_mod }
  binding_tables: [[t_order, t_order_item]]
  broadcast_tables: [t_config]
  algorithms:
    db_mod: { type: MOD, props: { sharding-count: 2 } }
    t_order_inline:
      type: INLINE
      props: { algorithm-expression: "t_order_${order_id % 2}", allow-range-query-with-inline-sharding: true }
    t_order_item_inline: { type: INLINE, props: { algorithm-expression: "t_order_item_${order_id % 2}" } }
"#;

pub fn rule_set(yaml: &str) -> crate::rule::RuleSet {
    let config = data_panel_common::config::RuleConfiguration::from_yaml_str(yaml).unwrap();
    crate::rule::RuleSet::new(&config, &crate::rule::AlgorithmRegistry::default()).unwrap()
}

pub fn order_sharding_rule() -> crate::rule::ShardingRule {
    let rules = rule_set(ORDER_SHARDING_YAML);
    rules.sharding.as_deref().cloned().unwrap()
}
