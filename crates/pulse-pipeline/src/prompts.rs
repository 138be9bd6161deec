use pulse_models::ticker::Ticker;

use crate::grounding::Grounding;

/// Line separating the Markdown report from the signals JSON.
pub const JSON_MARKER: &str = "-->Json:";

pub fn system_prompt() -> String {
    "You are a financial analyst writing a grounded daily market brief in English. \
     Base every statement strictly on the news and indicators you are given. \
     If information is not present, say \"not available\" rather than assuming."
        .to_string()
}

fn signals_example(tickers: &[Ticker]) -> String {
    let entries: Vec<serde_json::Value> = tickers
        .iter()
        .map(|t| {
            serde_json::json!({
                "ticker": t.symbol,
                "name": "<company name>",
                "action": "buy|sell|hold",
                "reason": "1-2 sentences citing the relevant sources, e.g. [1]"
            })
        })
        .collect();
    serde_json::to_string_pretty(&serde_json::json!({ "signals": entries })).unwrap_or_default()
}

/// The user prompt: output contract plus the assembled grounding.
pub fn user_prompt(grounding: &Grounding, tickers: &[Ticker]) -> String {
    let symbols: Vec<&str> = tickers.iter().map(|t| t.symbol.as_str()).collect();
    let source_count = grounding.source_count();

    let indicators_rule = if grounding.include_indicators {
        "2) Key Indicators: a very short bullet list of the indicator values given below. \
         Mark tickers without data as \"not available\"."
    } else {
        "2) Do NOT write a Key Indicators section. No indicator data is available."
    };

    let citation_rule = if source_count == 0 {
        "There are no numbered sources for this run. Do not write any [n] citations.".to_string()
    } else {
        format!(
            "Cite sources inline as [n] where n is between 1 and {source_count}. \
             Never cite a number outside that range."
        )
    };

    format!(
        "Write a daily market brief for these tickers: {tickers}.\n\n\
         ## OUTPUT FORMAT\n\n\
         First the full Markdown report:\n\
         1) ## Daily Brief: a single paragraph of 4-7 concise sentences on the day's key \
         market narratives and how they affect these equities.\n\
         {indicators_rule}\n\
         3) ## Insights: short bullets per ticker. Every claim derived from news cites it.\n\
         4) ## Sources: the numbered list 1..{source_count} exactly as given below.\n\n\
         Then a line containing only `{marker}` followed by a JSON object:\n\
         {example}\n\n\
         ## RULES\n\n\
         - {citation_rule}\n\
         - Use tickers exactly as given (uppercase). Do not introduce new tickers.\n\
         - Give exactly one signal per ticker. action is one of buy, sell, hold.\n\
         - A ticker with no news must not cite any source in its reason.\n\
         - The JSON must be machine-readable: no comments, no trailing commas, no code fences.\n\n\
         ## GROUNDING\n\n\
         {blocks}\n\n\
         {sources}\n",
        tickers = symbols.join(", "),
        marker = JSON_MARKER,
        example = signals_example(tickers),
        blocks = grounding.render_blocks(),
        sources = grounding.render_sources(),
    )
}
