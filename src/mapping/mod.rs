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

//! Rule planning and execution

pub mod correlate;
pub mod engine;
pub mod fingerprint;
pub mod format;
pub mod hints;
pub mod transform;

pub use correlate::{CorrelationTarget, IndexCorrelation, correlate};
pub use engine::MappingEngine;
pub use fingerprint::fingerprint;
pub use format::{apply_format, coerce, format_template};
pub use hints::{DynamicIndexRenames, PlacementHints, RuleHints};
pub use transform::{ValueInputs, ValueMode, ValueTransform};
