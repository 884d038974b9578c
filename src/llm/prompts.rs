pub const CYPHER_GENERATION_TEMPLATE: &str = r#"
Task: Generate a Cypher statement to query a Northwind retail database.

Database Schema:
{schema}

Rules:
1. Use case-insensitive matching: WHERE toLower(n.property) CONTAINS toLower("value")
2. Use DISTINCT to avoid duplicates
3. LIMIT results to 50 unless user asks for more
4. Return meaningful properties (names, not just IDs)
5. CRITICAL: Always include the WHERE filter values in RETURN so results are self-explanatory

Example:
Question: Which suppliers provide products ordered by customers in London?
Cypher: MATCH (s:Supplier)-[:SUPPLIES]->(p:Product)<-[:ORDERS]-(:Order)<-[:PURCHASED]-(c:Customer)
        WHERE toLower(c.city) CONTAINS toLower("London")
        RETURN DISTINCT s.companyName AS Supplier, p.productName AS Product, c.companyName AS Customer, c.city AS CustomerCity
        LIMIT 50

Question: {question}

Cypher Query:
"#;

pub const QA_TEMPLATE: &str = r#"
You are a helpful assistant analysing retail data from the Northwind database.

Context from Database:
{context}

Instructions:
1. Provide a clear, business-focused answer
2. Summarise key findings (counts, patterns, notable items)
3. Format lists with bullet points if there are multiple items
4. If no data found, say so clearly
5. Reference the specific entities from the query results in your answer

Question: {question}

Answer:
"#;

pub const EXAMPLE_QUERIES: [&str; 3] = [
    "Which suppliers provide products ordered by customers in London?",
    "What categories has employee Nancy Davolio sold, with order counts?",
    "Show customers whose orders were handled by employees reporting to Andrew Fuller",
];

/// Substitute `{name}` placeholders. Each value is inserted once, so braces inside
/// values are left alone.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let hit = after.find('}').and_then(|end| {
            let name = &after[..end];
            vars.iter().find(|(k, _)| *k == name).map(|(_, v)| (end, *v))
        });
        match hit {
            Some((end, value)) => {
                out.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Pull the statement out of a model reply: the first fenced block if there is one,
/// minus a leading `cypher` language tag.
pub fn extract_cypher(reply: &str) -> String {
    let mut text = reply.trim();
    if let Some(open) = text.find("```") {
        let body = &text[open + 3..];
        text = match body.find("```") {
            Some(close) => &body[..close],
            None => body,
        };
    }
    let text = text.trim_start();
    let text = match text.get(..6) {
        Some(tag) if tag.eq_ignore_ascii_case("cypher")
            && text[6..].starts_with(|c: char| c.is_whitespace()) => &text[6..],
        _ => text,
    };
    text.trim().to_string()
}
