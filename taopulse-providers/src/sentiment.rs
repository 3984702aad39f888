//! Tweet cleaning, prompt construction, and score extraction.

use once_cell::sync::Lazy;
use regex::Regex;
use taopulse_core::{ScoreError, SignalItem};

/// Lowest score a model may report.
pub const SCORE_MIN: i64 = -100;
/// Highest score a model may report.
pub const SCORE_MAX: i64 = 100;

static MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"@\w+").expect("valid regex"));
static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").expect("valid regex"));
static HASHTAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"#(\w+)").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static SCORE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<score>(.*?)</score>").expect("valid regex"));
static SIGNED_INT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-+]?\d+").expect("valid regex"));

/// Strip mentions and URLs, unwrap hashtags, and collapse whitespace.
pub fn clean_tweet(text: &str) -> String {
    let text = MENTION.replace_all(text, "");
    let text = URL.replace_all(&text, "");
    let text = HASHTAG.replace_all(&text, "$1");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Clean every item and drop the ones left empty.
pub fn clean_items(items: &[SignalItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| clean_tweet(&item.text))
        .filter(|text| !text.is_empty())
        .collect()
}

const PROMPT_HEADER: &str = "\
You are an expert in sentiment analysis of social media posts about blockchain and AI, \
in particular Bittensor and decentralized AI. Analyze the tweets below and give one overall \
sentiment score.

<tweets>
";

const PROMPT_FOOTER: &str = "\
</tweets>

Consider positive and negative language, enthusiasm (emojis, exclamation marks), sarcasm or \
irony, and the context of Bittensor and decentralized AI. Score each tweet from -100 (extremely \
negative) to +100 (extremely positive), then compute an overall score as a weighted average that \
gives more weight to strongly positive or negative tweets.

Explain your reasoning briefly inside <sentiment_breakdown></sentiment_breakdown> tags, then give \
the final score as a single integer between -100 and +100 inside <score></score> tags.
";

/// Build the sentiment prompt for already-cleaned tweets.
pub fn build_prompt(tweets: &[String]) -> String {
    let mut prompt = String::from(PROMPT_HEADER);
    for tweet in tweets {
        prompt.push_str("- ");
        prompt.push_str(tweet);
        prompt.push('\n');
    }
    prompt.push_str(PROMPT_FOOTER);
    prompt
}

/// Extract the score from the first `<score>` block of a completion.
///
/// The first signed integer inside the block is used, clamped to
/// [`SCORE_MIN`]..=[`SCORE_MAX`].
pub fn extract_score(content: &str) -> Result<i64, ScoreError> {
    let block = SCORE_BLOCK
        .captures(content)
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| ScoreError::Unparseable {
            reason: "no <score> block in completion".to_string(),
        })?;

    let number = SIGNED_INT
        .find(block.as_str())
        .ok_or_else(|| ScoreError::Unparseable {
            reason: format!("no integer in score block: {:?}", block.as_str().trim()),
        })?
        .as_str();

    let value = match number.parse::<i64>() {
        Ok(value) => value,
        // Only overflow can fail here; saturate toward the sign.
        Err(_) if number.starts_with('-') => SCORE_MIN,
        Err(_) => SCORE_MAX,
    };
    Ok(value.clamp(SCORE_MIN, SCORE_MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_clean_tweet() {
        assert_eq!(
            clean_tweet("@opentensor   #Bittensor subnet 18 is up https://t.co/xyz  "),
            "Bittensor subnet 18 is up"
        );
        assert_eq!(clean_tweet("@a @b https://x.y"), "");
    }

    #[test]
    fn test_clean_items_drops_empty() {
        let items = vec![
            SignalItem::new("@only_a_mention"),
            SignalItem::new("this is good"),
        ];
        assert_eq!(clean_items(&items), vec!["this is good".to_string()]);
    }

    #[test]
    fn test_build_prompt_lists_tweets() {
        let prompt = build_prompt(&["one".to_string(), "two".to_string()]);
        assert!(prompt.contains("<tweets>\n- one\n- two\n</tweets>"));
        assert!(prompt.contains("<score></score>"));
    }

    #[test]
    fn test_extract_score() {
        assert_eq!(extract_score("...<score>42</score>"), Ok(42));
        assert_eq!(extract_score("<score>\n  -35\n</score>"), Ok(-35));
        assert_eq!(extract_score("<score>Final: +7 points</score>"), Ok(7));
        assert_eq!(extract_score("<score>250</score>"), Ok(100));
        assert_eq!(extract_score("<score>-99999999999999999999</score>"), Ok(-100));
        assert_eq!(
            extract_score("<score>1</score> and later <score>2</score>"),
            Ok(1)
        );
    }

    #[test]
    fn test_extract_score_failures() {
        assert!(matches!(
            extract_score("the score is 50"),
            Err(ScoreError::Unparseable { .. })
        ));
        assert!(matches!(
            extract_score("<score>positive</score>"),
            Err(ScoreError::Unparseable { .. })
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Any integer inside a score block comes back clamped to the range.
        #[test]
        fn prop_extracted_score_in_range(n in any::<i64>(), prefix in "[a-z ]{0,20}") {
            let content = format!("{prefix}<score>{n}</score>");
            let score = extract_score(&content).expect("score block present");
            prop_assert!((SCORE_MIN..=SCORE_MAX).contains(&score));
            prop_assert_eq!(score, n.clamp(SCORE_MIN, SCORE_MAX));
        }

        /// Whitespace is always collapsed and trimmed.
        #[test]
        fn prop_clean_tweet_whitespace(text in "[a-zA-Z0-9@#:/. \t\n]{0,80}") {
            let cleaned = clean_tweet(&text);
            prop_assert_eq!(cleaned.trim(), cleaned.as_str());
            prop_assert!(!cleaned.contains("  "));
            prop_assert!(!cleaned.contains('\t') && !cleaned.contains('\n'));
        }

        /// Mentions and URLs vanish, hashtags keep their word, plain words
        /// survive in order.
        #[test]
        fn prop_clean_tweet_tokens(tokens in proptest::collection::vec((0u8..4, "[a-z]{1,8}"), 0..12)) {
            let mut input = Vec::new();
            let mut expected = Vec::new();
            for (kind, word) in &tokens {
                match kind {
                    0 => {
                        input.push(word.clone());
                        expected.push(word.clone());
                    }
                    1 => input.push(format!("@{word}")),
                    2 => input.push(format!("https://{word}.io/x")),
                    _ => {
                        input.push(format!("#{word}"));
                        expected.push(word.clone());
                    }
                }
            }
            prop_assert_eq!(clean_tweet(&input.join("  ")), expected.join(" "));
        }
    }
}
