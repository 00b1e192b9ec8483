//! Extraction prompt shared by both strategies.
//!
//! Both strategies send the same instructions so their results are directly
//! comparable; only the evidence differs (page images vs. OCR text). The
//! prompt carries the target schema and the strictness rules the evaluation
//! depends on: countries are taken only from explicit statements, never from
//! where a party is located, and anything missing is `null`.

/// Instructions and JSON schema for invoice field extraction.
pub const EXTRACTION_PROMPT: &str = r#"Extract the following structured information from the provided trade document.

1. Parties
   - Every party named on the document
   - Its role (for example exporter, consignee, notify party, shipper)
   - Its location: city and country

2. Country Overview
   - Country of origin: only use information explicitly stated on the document
   - Country of destination: only use information explicitly stated on the document
   - Transit country: only if explicitly stated
   Do NOT infer the country of origin or destination from the location of any
   party or company. If a country is not explicitly stated, set it to null.

3. Commodity Details (a list)
   - Description of goods
   - HS code

4. Transportation
   - Means of transport
   - Vessel number

Respond strictly with valid JSON and nothing else. If any field is missing, set
its value to null. Use exactly this structure:

{
  "Parties": [
    {
      "PartyName": string | null,
      "Role": string | null,
      "Location": {"City": string | null, "Country": string | null}
    }
  ],
  "CountryOverview": {
    "CountryOfOrigin": string | null,
    "CountryOfDestination": string | null,
    "TransitCountry": string | null
  },
  "CommodityDetails": [
    {"DescriptionOfGoods": string | null, "HSCode": string | null}
  ],
  "Transportation": {
    "MeansOfTransport": string | null,
    "VesselNumber": string | null
  }
}"#;

/// Build the text-only prompt for the OCR strategy.
pub fn ocr_prompt(ocr_text: &str) -> String {
    format!("{EXTRACTION_PROMPT}\n\nDocument text:\n\n{ocr_text}")
}
