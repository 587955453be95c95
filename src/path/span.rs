// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Source location tracking for parsers

use nom_locate::LocatedSpan;

/// Type alias for located spans in the input
pub type Span<'a> = LocatedSpan<&'a str>;

/// Byte offset of a span within the original input
pub fn position(span: &Span<'_>) -> usize {
    span.location_offset()
}
