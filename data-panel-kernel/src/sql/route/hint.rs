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

use std::collections::BTreeMap;

use regex::Regex;

pub use crate::rule::readwrite::READ_DATA_SOURCE_HINT;
pub use crate::rule::shadow::SHADOW_HINT;

pub const WRITE_ROUTE_ONLY_HINT: &str = "WRITE_ROUTE_ONLY";
pub const IN_TRANSACTION_HINT: &str = "IN_TRANSACTION";

lazy_static! {
    static ref MESH_HINT: Regex = Regex::new(r"(?s)^\s*/\*\s*(?i:MESH_HINT)\s*:(.*?)\*/").unwrap();
}

/// Key/value pairs of a leading `/* MESH_HINT: SHADOW=true, ... */` comment.
/// Keys are upper-cased, a key without value reads as `true`.
pub fn parse_sql_hints(sql: &str) -> BTreeMap<String, String> {
    let mut hints = BTreeMap::new();
    let body = match MESH_HINT.captures(sql).and_then(|captures| captures.get(1)) {
        Some(body) => body.as_str(),
        None => return hints,
    };
    for pair in body.split(',') {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next().unwrap_or_default().trim();
        if key.is_empty() {
            continue;
        }
        let value = parts.next().map_or("true", |value| value.trim());
        hints.insert(key.to_ascii_uppercase(), value.to_string());
    }
    hints
}

/// SQL hints overlaid with the caller's, the caller wins.
pub fn merge_hints(sql: &str, caller: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut hints = parse_sql_hints(sql);
    for (key, value) in caller {
        hints.insert(key.to_ascii_uppercase(), value.clone());
    }
    hints
}
