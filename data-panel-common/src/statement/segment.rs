// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt;

/// Inclusive byte offsets `[start, stop]` into the SQL text a statement was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Span {
    pub start: usize,
    pub stop: usize,
}

impl Span {
    pub fn new(start: usize, stop: usize) -> Self {
        Span { start, stop }
    }

    pub fn len(&self) -> usize {
        self.stop + 1 - self.start
    }

    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.stop <= self.stop
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.stop)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuoteCharacter {
    None,
    BackQuote,
    Quote,
    SquareBracket,
}

impl QuoteCharacter {
    pub fn wrap(&self, value: &str) -> String {
        match self {
            QuoteCharacter::None => value.to_string(),
            QuoteCharacter::BackQuote => format!("`{}`", value),
            QuoteCharacter::Quote => format!("\"{}\"", value),
            QuoteCharacter::SquareBracket => format!("[{}]", value),
        }
    }
}

impl Default for QuoteCharacter {
    fn default() -> Self {
        QuoteCharacter::None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentifierValue {
    pub value: String,
    pub quote: QuoteCharacter,
}

impl IdentifierValue {
    pub fn new(value: &str) -> Self {
        IdentifierValue {
            value: value.to_string(),
            quote: QuoteCharacter::None,
        }
    }

    pub fn quoted(value: &str, quote: QuoteCharacter) -> Self {
        IdentifierValue {
            value: value.to_string(),
            quote,
        }
    }

    /// SQL identifiers compare case-insensitively.
    pub fn matches(&self, name: &str) -> bool {
        self.value.eq_ignore_ascii_case(name)
    }
}

impl fmt::Display for IdentifierValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.quote.wrap(&self.value))
    }
}

/// Qualifier in front of a table or column, `db` in `db.t_order` or `o` in `o.id`.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnerSegment {
    pub span: Span,
    pub identifier: IdentifierValue,
    pub owner: Option<Box<OwnerSegment>>,
}

impl OwnerSegment {
    pub fn new(span: Span, name: &str) -> Self {
        OwnerSegment {
            span,
            identifier: IdentifierValue::new(name),
            owner: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.identifier.value
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AliasSegment {
    pub span: Span,
    pub identifier: IdentifierValue,
}

impl AliasSegment {
    pub fn new(span: Span, name: &str) -> Self {
        AliasSegment {
            span,
            identifier: IdentifierValue::new(name),
        }
    }

    pub fn name(&self) -> &str {
        &self.identifier.value
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSegment {
    pub span: Span,
    pub identifier: IdentifierValue,
    pub owner: Option<OwnerSegment>,
}

impl ColumnSegment {
    pub fn new(span: Span, name: &str) -> Self {
        ColumnSegment {
            span,
            identifier: IdentifierValue::new(name),
            owner: None,
        }
    }

    pub fn with_owner(mut self, owner: OwnerSegment) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn name(&self) -> &str {
        &self.identifier.value
    }

    pub fn owner_name(&self) -> Option<&str> {
        self.owner.as_ref().map(|owner| owner.name())
    }

    /// Span of the bare column name, without its owner qualifier.
    pub fn name_span(&self) -> Span {
        match &self.owner {
            Some(owner) => Span::new(owner.span.stop + 2, self.span.stop),
            None => self.span,
        }
    }

    pub fn qualified_name(&self) -> String {
        match self.owner_name() {
            Some(owner) => format!("{}.{}", owner, self.name()),
            None => self.name().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableNameSegment {
    pub span: Span,
    pub identifier: IdentifierValue,
}

impl TableNameSegment {
    pub fn new(span: Span, name: &str) -> Self {
        TableNameSegment {
            span,
            identifier: IdentifierValue::new(name),
        }
    }
}
