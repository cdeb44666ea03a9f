//! キーワードによる応答フィルタ

/// コメントに応答すべきか判定する
///
/// キーワードが空なら常に `true`。それ以外はいずれかのキーワードを
/// 大文字小文字を区別せず部分一致で含む場合に `true`。
pub fn should_respond(comment_text: &str, keywords: &[String]) -> bool {
    KeywordGate::new(keywords).matches(comment_text)
}

/// 小文字化済みキーワードを保持するフィルタ
#[derive(Debug, Clone, Default)]
pub struct KeywordGate {
    lowercased_keywords: Vec<String>,
}

impl KeywordGate {
    /// 空白だけのキーワードは無視する
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Self {
        let lowercased_keywords = keywords
            .iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self {
            lowercased_keywords,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.lowercased_keywords.is_empty()
    }

    pub fn matches(&self, comment_text: &str) -> bool {
        if !self.is_active() {
            return true;
        }

        let content_lower = comment_text.to_lowercase();
        self.lowercased_keywords
            .iter()
            .any(|keyword| content_lower.contains(keyword))
    }
}
