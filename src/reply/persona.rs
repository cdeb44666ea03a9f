//! ペルソナプロンプト

use std::path::Path;

/// ペルソナ中のキャラクター名プレースホルダ
pub const CHARACTER_PLACEHOLDER: &str = "{character}";

/// 組み込みのペルソナ
pub const DEFAULT_PERSONA: &str = "\
あなたは『{character}』という元気な女の子です。
タメ口で、ちょっと幼い話し方をします。
今は配信に一緒に出演していて、コメントで話しかけてくるリスナーさんとおしゃべりしています。
リスナーではなく「配信に出ている側」として受け答えをしてください。
返事は短く、2〜3文にまとめてください。";

/// ペルソナを読み込む
///
/// ファイルが未指定・読み込み失敗・空の場合は組み込みのペルソナを使う。
pub fn load_persona(path: Option<&Path>, character: &str) -> String {
    let text = match path {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(text) if !text.trim().is_empty() => {
                tracing::info!("🎭 ペルソナを読み込みました: {}", path.display());
                text
            }
            Ok(_) => {
                tracing::warn!(
                    "⚠️ ペルソナファイルが空です。組み込みのペルソナを使います: {}",
                    path.display()
                );
                DEFAULT_PERSONA.to_string()
            }
            Err(e) => {
                tracing::warn!(
                    "⚠️ ペルソナファイルの読み込みに失敗しました。組み込みのペルソナを使います: {}: {}",
                    path.display(),
                    e
                );
                DEFAULT_PERSONA.to_string()
            }
        },
        None => DEFAULT_PERSONA.to_string(),
    };

    text.trim().replace(CHARACTER_PLACEHOLDER, character)
}

/// 送信者に合わせたシステムプロンプトを組み立てる
pub fn build_prompt(persona_text: &str, sender_name: &str) -> String {
    format!(
        "{}\n\nこれは「{}」さんからのコメントだよ。\nキャラクターになりきって、明るく返事をしてね。",
        persona_text.trim_end(),
        sender_name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_persona_when_unset() {
        let persona = load_persona(None, "Aki");
        assert!(persona.contains("『Aki』"));
        assert!(!persona.contains(CHARACTER_PLACEHOLDER));
    }

    #[test]
    fn test_missing_file_falls_back() {
        let temp_dir = TempDir::new().unwrap();
        let persona = load_persona(Some(temp_dir.path().join("missing.txt").as_path()), "Aki");
        assert_eq!(persona, DEFAULT_PERSONA.trim().replace(CHARACTER_PLACEHOLDER, "Aki"));
    }

    #[test]
    fn test_file_persona_is_used() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("persona.txt");
        std::fs::write(&path, "You are {character}, a calm robot.\n").unwrap();

        let persona = load_persona(Some(path.as_path()), "Unit-7");
        assert_eq!(persona, "You are Unit-7, a calm robot.");
    }

    #[test]
    fn test_empty_file_falls_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("persona.txt");
        std::fs::write(&path, "   \n").unwrap();

        assert!(load_persona(Some(path.as_path()), "Aki").contains("『Aki』"));
    }

    #[test]
    fn test_build_prompt_includes_sender() {
        let prompt = build_prompt("persona text\n", "Alice");
        assert!(prompt.starts_with("persona text\n\n"));
        assert!(prompt.contains("「Alice」"));
    }
}
