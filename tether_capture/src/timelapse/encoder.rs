use crate::clock::TIMESTAMP_FORMAT;
use crate::error::{CaptureError, Result};
use chrono::NaiveDateTime;
use crossbeam_channel::Receiver;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

const FRAME_PREFIX: &str = "frame-";
/// Length of a `%Y-%m-%d_%H:%M:%S` timestamp.
const TIMESTAMP_LEN: usize = 19;

/// Batch ImageJ macro applied to a whole folder before stitching.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageJMacro {
    pub jar: PathBuf,
    pub macro_file: PathBuf,
    pub name: String,
    pub output_dir: PathBuf,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StitchJob {
    pub image_dir: PathBuf,
    /// Rate at which captured frames are played back.
    pub input_fps: u32,
    pub imagej: Option<ImageJMacro>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EncodingOutput {
    pub output_path: PathBuf,
    pub frames: usize,
}

pub enum EncodingMessage {
    Frame { index: usize, total: usize },
    Done(EncodingOutput),
    Failed(String),
}

/// Finds the capture time embedded in an artifact name.
pub fn frame_time(file_name: &str) -> Option<NaiveDateTime> {
    if file_name.len() < TIMESTAMP_LEN {
        return None;
    }
    (0..=file_name.len() - TIMESTAMP_LEN)
        .filter(|start| {
            file_name.is_char_boundary(*start) && file_name.is_char_boundary(start + TIMESTAMP_LEN)
        })
        .find_map(|start| {
            NaiveDateTime::parse_from_str(&file_name[start..start + TIMESTAMP_LEN], TIMESTAMP_FORMAT)
                .ok()
        })
}

/// Time of day for the watermark, colons escaped for ffmpeg's filter parser.
pub fn watermark_text(time: &NaiveDateTime) -> String {
    time.format("%H:%M:%S").to_string().replace(':', "\\:")
}

/// Image files of `dir` sorted by name, which is capture order.
fn ordered_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = vec![];
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if entry.metadata()?.is_file() && !name.starts_with(FRAME_PREFIX) && !name.ends_with(".avi") {
            images.push(entry.path());
        }
    }
    images.sort();
    Ok(images)
}

fn run_tool(command: &mut Command, what: &str) -> Result<()> {
    let output = command
        .output()
        .map_err(|e| CaptureError::Encoding(format!("could not start {}: {}", what, e)))?;
    if !output.status.success() {
        return Err(CaptureError::Encoding(format!(
            "{} failed: {}",
            what,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

/// ImageJ is not smart about paths, folders need a trailing separator.
fn imagej_dir(dir: &Path) -> String {
    let mut dir = dir.to_string_lossy().to_string();
    if !dir.ends_with(std::path::MAIN_SEPARATOR) {
        dir.push(std::path::MAIN_SEPARATOR);
    }
    dir
}

fn run_imagej(imagej: &ImageJMacro, input_dir: &Path) -> Result<()> {
    fs::create_dir_all(&imagej.output_dir)?;
    info!("Running ImageJ macro {}", imagej.name);
    run_tool(
        Command::new("java")
            .arg("-jar")
            .arg(&imagej.jar)
            .arg("-macro")
            .arg(&imagej.macro_file)
            .arg(format!(
                "{}#{}#{}",
                imagej.name,
                imagej_dir(input_dir),
                imagej_dir(&imagej.output_dir)
            )),
        "ImageJ",
    )
}

fn watermark(input: &Path, text: &str, output: &Path) -> Result<()> {
    run_tool(
        Command::new("ffmpeg")
            .arg("-y")
            .arg("-i")
            .arg(input)
            .arg("-vf")
            .arg(format!(
                "drawtext=text='{}':fontcolor=white:fontsize=140:x=w-tw-(tw/8):y=th+(th/8)",
                text
            ))
            .arg(output),
        "ffmpeg watermark",
    )
}

fn encode(dir: &Path, input_fps: u32, output: &Path) -> Result<()> {
    run_tool(
        Command::new("ffmpeg")
            .arg("-y")
            .arg("-framerate")
            .arg(input_fps.to_string())
            .arg("-i")
            .arg(dir.join(format!("{}%d.jpg", FRAME_PREFIX)))
            .arg("-r")
            .arg("30")
            .arg(output),
        "ffmpeg encoding",
    )
}

fn run_job(job: &StitchJob, on_frame: &dyn Fn(usize, usize)) -> Result<EncodingOutput> {
    let mut work_dir = job.image_dir.canonicalize()?;
    if let Some(imagej) = &job.imagej {
        run_imagej(imagej, &work_dir)?;
        work_dir = imagej.output_dir.canonicalize()?;
    }

    let images = ordered_images(&work_dir)?;
    let total = images.len();
    // ffmpeg wants the frame numbering to start at 0 and have no gaps
    let mut frames = 0;
    for image in &images {
        let name = image.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let time = match frame_time(&name) {
            Some(time) => time,
            None => {
                warn!("No timestamp in {}, leaving it out of the video", name);
                continue;
            }
        };
        let frame = work_dir.join(format!("{}{}.jpg", FRAME_PREFIX, frames));
        watermark(image, &watermark_text(&time), &frame)?;
        frames += 1;
        on_frame(frames, total);
    }
    if frames == 0 {
        return Err(CaptureError::Encoding(format!(
            "no timestamped images in {}",
            work_dir.display()
        )));
    }

    let subject = work_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "timelapse".to_string());
    let output_path = work_dir.join(format!("{}.avi", subject));
    let encoded = encode(&work_dir, job.input_fps, &output_path);

    // intermediate watermarked frames go either way
    for index in 0..frames {
        let frame = work_dir.join(format!("{}{}.jpg", FRAME_PREFIX, index));
        if let Err(e) = fs::remove_file(&frame) {
            debug!("Could not remove {}: {}", frame.display(), e);
        }
    }
    encoded?;

    Ok(EncodingOutput {
        output_path,
        frames,
    })
}

/// Watermarks and encodes on a worker thread, reporting progress over the
/// returned channel. The last message is always `Done` or `Failed`.
pub fn start_encoding_thread(job: StitchJob) -> Receiver<EncodingMessage> {
    info!("Starting encoding thread");
    let (sender, receiver) = crossbeam_channel::unbounded::<EncodingMessage>();
    std::thread::spawn(move || {
        let progress = sender.clone();
        let on_frame = move |index, total| {
            let _ = progress.send(EncodingMessage::Frame { index, total });
        };
        let message = match run_job(&job, &on_frame) {
            Ok(output) => EncodingMessage::Done(output),
            Err(e) => EncodingMessage::Failed(e.to_string()),
        };
        info!("Encoding thread done!");
        let _ = sender.send(message);
    });
    receiver
}

/// Runs a stitch job to completion.
pub fn stitch(job: StitchJob) -> Result<EncodingOutput> {
    let receiver = start_encoding_thread(job);
    loop {
        match receiver.recv() {
            Ok(EncodingMessage::Frame { index, total }) => {
                debug!("Watermarked frame {} of {}", index, total)
            }
            Ok(EncodingMessage::Done(output)) => return Ok(output),
            Ok(EncodingMessage::Failed(reason)) => return Err(CaptureError::Encoding(reason)),
            Err(_) => {
                return Err(CaptureError::Encoding(
                    "encoding thread stopped without reporting".to_string(),
                ))
            }
        }
    }
}
