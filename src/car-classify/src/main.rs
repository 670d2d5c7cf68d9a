use std::error::Error;
use std::fs;
use std::path::PathBuf;

use log::info;
use structopt::StructOpt;

use car_serve::{ImageClassifier, LabelSet};

#[derive(StructOpt, Debug)]
#[structopt(
    name = "car-classify",
    about = "CLI app to classify a car photo into one of the known model classes"
)]
struct CmdArgs {
    #[structopt(help = "Export directory of the SavedModel")]
    export_dir: PathBuf,

    #[structopt(help = "Path to the labels file, one class name per line")]
    labels_path: PathBuf,

    #[structopt(help = "Image to classify: local file path or http(s) URL")]
    image: String,
}

fn read_image(source: &str) -> Result<Vec<u8>, Box<dyn Error>> {
    if source.starts_with("http://") || source.starts_with("https://") {
        info!("fetching image from {}", source);
        let response = reqwest::blocking::get(source)?.error_for_status()?;
        Ok(response.bytes()?.to_vec())
    } else {
        Ok(fs::read(source)?)
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = CmdArgs::from_args();

    let labels = LabelSet::from_file(&args.labels_path)?;
    let classifier = ImageClassifier::new(&args.export_dir, labels)?;

    let data = read_image(&args.image)?;
    let prediction = classifier.classify_bytes(&data)?;

    println!("{}", serde_json::to_string(&prediction)?);

    Ok(())
}
