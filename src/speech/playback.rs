//! 音声ファイルの再生

use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::error::SpeechError;

/// 音声出力トレイト
pub trait AudioOutput: Send + Sync {
    /// ファイルをデコードして再生し、再生完了まで待つ（ブロッキング）
    fn play_file(&self, path: &Path, device: Option<&str>) -> Result<(), SpeechError>;
}

/// rodioによる音声出力
#[derive(Debug, Default, Clone, Copy)]
pub struct RodioOutput;

impl AudioOutput for RodioOutput {
    fn play_file(&self, path: &Path, device: Option<&str>) -> Result<(), SpeechError> {
        // 音声出力ストリームを作成
        let (_stream, stream_handle) = open_output_stream(device)?;

        let sink = Sink::try_new(&stream_handle)
            .map_err(|e| SpeechError::AudioOutput(format!("音声シンクの作成に失敗: {}", e)))?;

        let file = File::open(path)?;
        let source = Decoder::new(BufReader::new(file))
            .map_err(|e| SpeechError::AudioDecode(format!("デコードに失敗: {}", e)))?;

        sink.append(source);
        sink.sleep_until_end();

        Ok(())
    }
}

/// 出力デバイスを名前で選んでストリームを開く
fn open_output_stream(
    device: Option<&str>,
) -> Result<(OutputStream, OutputStreamHandle), SpeechError> {
    let Some(name) = device else {
        return OutputStream::try_default()
            .map_err(|e| SpeechError::AudioOutput(format!("音声出力の初期化に失敗: {}", e)));
    };

    let host = rodio::cpal::default_host();
    let selected = host
        .output_devices()
        .map_err(|e| SpeechError::AudioOutput(format!("出力デバイスの列挙に失敗: {}", e)))?
        .find(|d| d.name().map(|n| n == name).unwrap_or(false))
        .ok_or_else(|| {
            SpeechError::AudioOutput(format!("出力デバイスが見つかりません: {}", name))
        })?;

    OutputStream::try_from_device(&selected)
        .map_err(|e| SpeechError::AudioOutput(format!("音声出力の初期化に失敗: {}", e)))
}

/// 出力デバイス名の一覧
pub fn list_output_devices() -> Result<Vec<String>, SpeechError> {
    let host = rodio::cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| SpeechError::AudioOutput(format!("出力デバイスの列挙に失敗: {}", e)))?;

    Ok(devices.filter_map(|d| d.name().ok()).collect())
}
