//
// Copyright 2025 The Project Oak Authors
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
//

/// The quote text produced by `tpm2_quote`, reduced to the two values the CA
/// keeps.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TpmQuote {
    /// PCR composite hash.
    pub hash: String,
    pub signature: String,
}

impl TpmQuote {
    const SIGNATURE_MARKER: &'static str = "signature";

    /// Splits the quote text on `:`. The second segment is the hash, possibly
    /// followed by the `signature` header of the next line, and the third one
    /// is the signature. Returns `None` when there are fewer than three
    /// segments.
    pub fn parse(quote: &[u8]) -> Option<Self> {
        let text = String::from_utf8_lossy(quote);
        let segments: Vec<&str> = text.split(':').collect();
        if segments.len() < 3 {
            return None;
        }
        Some(Self {
            hash: segments[1].replace(Self::SIGNATURE_MARKER, "").trim().to_string(),
            signature: segments[2].trim().to_string(),
        })
    }
}
