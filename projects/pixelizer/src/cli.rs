use crate::pipeline::types::JobMode;
use crate::video::DecoderBackend;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Parent directory for per-job working directories
    #[arg(long, env = "PIXELIZER_WORK_ROOT", default_value = "temp")]
    pub work_root: PathBuf,

    /// ffmpeg executable used for audio extraction, concatenation and remuxing
    #[arg(long, env = "PIXELIZER_FFMPEG", default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,

    /// Haar cascade XML used for face detection
    #[arg(
        long,
        env = "PIXELIZER_FACE_CASCADE",
        default_value = "haarcascade_frontalface_default.xml"
    )]
    pub face_cascade: PathBuf,

    /// Video decoder
    #[arg(long, env = "PIXELIZER_BACKEND", value_enum, default_value_t = DecoderBackend::Opencv)]
    pub backend: DecoderBackend,

    /// Parallel workers, at most min(4, available cores) (the default)
    #[arg(long, env = "PIXELIZER_WORKERS")]
    pub workers: Option<usize>,

    /// Write a JSON job report to this path
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Pixelate every frame of a video, or an image
    Pixelize {
        input: PathBuf,

        /// Side of a square cell in pixels
        #[arg(long, short = 's', default_value_t = 8)]
        pixel_size: u32,

        /// Palette depth per channel (4, 8, 16, 32 or 64). Raw colors when omitted.
        #[arg(long, short = 'c')]
        color_depth: Option<u32>,

        /// Output path (default: <input stem>_pixelized.<ext> next to the input)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
    /// Pixelate only the faces of a video, or an image
    Anonymize {
        input: PathBuf,

        /// Output path (default: <input stem>_anonymized.<ext> next to the input)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
}

impl Command {
    pub fn input(&self) -> &PathBuf {
        match self {
            Command::Pixelize { input, .. } | Command::Anonymize { input, .. } => input,
        }
    }

    pub fn mode(&self) -> JobMode {
        match self {
            Command::Pixelize {
                pixel_size,
                color_depth,
                ..
            } => JobMode::Pixelize {
                pixel_size: *pixel_size,
                color_depth: *color_depth,
            },
            Command::Anonymize { .. } => JobMode::Anonymize,
        }
    }

    /// Explicit output, or a sibling of the input with a mode suffix.
    pub fn output(&self) -> PathBuf {
        let (output, suffix) = match self {
            Command::Pixelize { output, .. } => (output, "pixelized"),
            Command::Anonymize { output, .. } => (output, "anonymized"),
        };
        if let Some(output) = output {
            return output.clone();
        }

        let input = self.input();
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut name = format!("{}_{}", stem, suffix);
        if let Some(ext) = input.extension() {
            name.push('.');
            name.push_str(&ext.to_string_lossy());
        }
        input.with_file_name(name)
    }
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixelize_args() {
        let args = Args::try_parse_from([
            "pixelizer",
            "--workers",
            "2",
            "pixelize",
            "clips/cat.mp4",
            "-s",
            "16",
            "-c",
            "8",
        ])
        .unwrap();
        assert_eq!(args.workers, Some(2));
        assert_eq!(
            args.command.mode(),
            JobMode::Pixelize {
                pixel_size: 16,
                color_depth: Some(8)
            }
        );
        assert_eq!(args.command.output(), PathBuf::from("clips/cat_pixelized.mp4"));
    }

    #[test]
    fn test_anonymize_explicit_output() {
        let args = Args::try_parse_from([
            "pixelizer",
            "--backend",
            "ffmpeg",
            "anonymize",
            "me.jpg",
            "-o",
            "out/me.jpg",
        ])
        .unwrap();
        assert_eq!(args.backend, DecoderBackend::Ffmpeg);
        assert_eq!(args.command.mode(), JobMode::Anonymize);
        assert_eq!(args.command.output(), PathBuf::from("out/me.jpg"));
    }
}
