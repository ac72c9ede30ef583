//! Prompt template for listing generation.

/// Number of relevant keywords the description should carry.
pub const KEYWORD_RANGE: (u32, u32) = (15, 30);

/// Sentence band for descriptions.
pub const SENTENCE_RANGE: (usize, usize) = (4, 7);

/// Builds the instruction text sent with every image.
///
/// The output depends only on the keyword hint, so every variant of every
/// image receives the same instructions.
#[derive(Debug, Clone, Default)]
pub struct PromptTemplate;

impl PromptTemplate {
    pub fn new() -> Self {
        Self
    }

    /// Render the prompt, optionally steering toward `keyword_hint`.
    pub fn render(&self, keyword_hint: Option<&str>) -> String {
        let (min_kw, max_kw) = KEYWORD_RANGE;
        let (min_sentences, max_sentences) = SENTENCE_RANGE;

        let mut prompt = format!(
            "You write Pinterest pin metadata for the product shown in the image.\n\
             Write in English.\n\
             \n\
             Title: 6 to 12 words, phrased for shoppers ready to buy \
             (for example \"Shop\", \"Buy\", \"Best ... for ...\").\n\
             Description: {min_sentences} to {max_sentences} sentences, 60 to 120 words in total. \
             Work in {min_kw} to {max_kw} relevant search keywords naturally: product type, \
             material, color, style, occasion and audience.\n\
             Do not use hashtags. Do not use emojis.\n\
             This request is one of several independent variants for the same image: \
             choose fresh wording, a different angle and a different keyword mix \
             rather than a generic phrasing another variant would also produce.\n\
             \n\
             Respond with a single JSON object and nothing else, with exactly two string fields:\n\
             {{\"title\": \"...\", \"description\": \"...\"}}"
        );

        if let Some(hint) = keyword_hint.map(str::trim).filter(|h| !h.is_empty()) {
            prompt.push_str(&format!(
                "\n\nPrioritise these keywords wherever they genuinely fit the product: {hint}"
            ));
        }

        prompt
    }
}
