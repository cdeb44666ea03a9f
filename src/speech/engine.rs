//! ローカル音声合成エンジン
//!
//! エンジンハンドルは話速・音声の設定を内部に持つステートフルなもので、
//! 同時に複数の呼び出しから使ってはいけない。

use std::io::Write;
use std::process::{Command, Stdio};

use super::error::SpeechError;

/// エンジンが提供する音声
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceInfo {
    /// エンジンに渡す識別子
    pub id: String,
    /// 表示名（設定の音声名と照合する）
    pub name: String,
    pub language: String,
}

/// ローカル音声合成エンジントレイト
pub trait SpeechEngine: Send {
    /// 利用可能な音声一覧
    fn voices(&mut self) -> Result<Vec<VoiceInfo>, SpeechError>;

    fn set_rate(&mut self, rate: u32);

    /// `None` でエンジン既定の音声に戻す
    fn set_voice(&mut self, voice_id: Option<&str>);

    /// 合成して再生し、再生完了まで待つ
    fn say_and_wait(&mut self, text: &str) -> Result<(), SpeechError>;
}

/// `espeak-ng` コマンドを使うエンジン
#[derive(Debug)]
pub struct EspeakEngine {
    program: String,
    rate: u32,
    voice: Option<String>,
    voices: Option<Vec<VoiceInfo>>,
}

impl Default for EspeakEngine {
    fn default() -> Self {
        Self::new("espeak-ng")
    }
}

impl EspeakEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            rate: 175,
            voice: None,
            voices: None,
        }
    }

    fn spawn_error(&self, e: std::io::Error) -> SpeechError {
        if e.kind() == std::io::ErrorKind::NotFound {
            SpeechError::BackendUnavailable(format!("{} が見つかりません", self.program))
        } else {
            SpeechError::Synthesis(format!("{} の起動に失敗: {}", self.program, e))
        }
    }
}

/// `espeak-ng --voices` の出力を解析
///
/// 列は `Pty Language Age/Gender VoiceName File Other...`。
pub fn parse_voice_list(output: &str) -> Vec<VoiceInfo> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            if columns.len() < 5 {
                return None;
            }
            Some(VoiceInfo {
                id: columns[1].to_string(),
                name: columns[3].to_string(),
                language: columns[1].to_string(),
            })
        })
        .collect()
}

impl SpeechEngine for EspeakEngine {
    fn voices(&mut self) -> Result<Vec<VoiceInfo>, SpeechError> {
        if let Some(voices) = &self.voices {
            return Ok(voices.clone());
        }

        let output = Command::new(&self.program)
            .arg("--voices")
            .output()
            .map_err(|e| self.spawn_error(e))?;
        let voices = parse_voice_list(&String::from_utf8_lossy(&output.stdout));
        tracing::debug!("🔍 音声一覧を取得: {}件", voices.len());

        self.voices = Some(voices.clone());
        Ok(voices)
    }

    fn set_rate(&mut self, rate: u32) {
        self.rate = rate;
    }

    fn set_voice(&mut self, voice_id: Option<&str>) {
        self.voice = voice_id.map(str::to_string);
    }

    fn say_and_wait(&mut self, text: &str) -> Result<(), SpeechError> {
        let mut command = Command::new(&self.program);
        command.arg("-s").arg(self.rate.to_string());
        if let Some(voice) = &self.voice {
            command.arg("-v").arg(voice);
        }

        // 本文は標準入力で渡す（先頭の "-" をオプション扱いさせない）
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes())?;
        }

        let status = child.wait()?;
        if !status.success() {
            return Err(SpeechError::Synthesis(format!(
                "{} が異常終了しました: {}",
                self.program, status
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_voice_list() {
        let output = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  af              --/M      Afrikaans          gmw/af
 5  en-us           --/M      English_(America)  gmw/en-US            (en 3)
 5  ja              --/M      Japanese           jpx/ja
";
        let voices = parse_voice_list(output);
        assert_eq!(voices.len(), 3);
        assert_eq!(voices[1].id, "en-us");
        assert_eq!(voices[1].name, "English_(America)");
        assert_eq!(voices[2].name, "Japanese");
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        let mut engine = EspeakEngine::new("aivc-no-such-tts-program");
        let err = engine.say_and_wait("test").unwrap_err();
        assert!(matches!(err, SpeechError::BackendUnavailable(_)));
    }
}
