use anyhow::{anyhow, Context, Result};
use clap::Parser as _;
use owo_colors::{colors, OwoColorize};
use piggy::tlv::TlvNode;
use piggy::track2::{self, Track2};
use piggy::{codec, emv, ndef, BerDescriber};
use tracing::{debug, trace, trace_span};

type TagColor = colors::Cyan;
type TemplateColor = colors::Yellow;
type ValueColor = colors::Green;
type MissingColor = colors::Red;

#[derive(clap::Parser, Debug)]
struct Args {
    /// Increase log level.
    #[arg(short, long, action=clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease log level.
    #[arg(short, long, action=clap::ArgAction::Count)]
    quiet: u8,

    /// Command.
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Encode byte values (decimal or 0x-prefixed) as hex.
    Encode {
        #[arg(allow_negative_numbers = true, value_parser = parse_value)]
        values: Vec<i64>,
    },

    /// Split a hex string into bytes, without complaining about garbage.
    Decode { hex: String },

    /// Describe a hex-encoded EMV response as a TLV tree.
    Describe { hex: String },

    /// Read the card number and expiry date from a hex-encoded EMV response.
    Card {
        /// Blank out the middle of the card number.
        #[arg(short, long)]
        mask: bool,

        hex: String,
    },

    /// Format a YYMM expiry date as MM/YY.
    Exp { exp: String },

    /// Decode a hex-encoded NDEF message.
    Ndef { hex: String },
}

impl Command {
    pub fn run(&self, args: &Args) -> Result<()> {
        match self {
            Self::Encode { values } => self.encode(args, values),
            Self::Decode { hex } => self.decode(args, hex),
            Self::Describe { hex } => self.describe(args, hex),
            Self::Card { mask, hex } => self.card(args, *mask, hex),
            Self::Exp { exp } => {
                println!("{}", track2::format_card_exp(exp));
                Ok(())
            }
            Self::Ndef { hex } => self.ndef(args, hex),
        }
    }

    fn encode(&self, _args: &Args, values: &[i64]) -> Result<()> {
        println!("{}", codec::to_hex_string_checked(values)?);
        Ok(())
    }

    fn decode(&self, _args: &Args, hex: &str) -> Result<()> {
        let bytes = codec::to_byte_array(hex);
        debug!(len = bytes.len(), "Decoded");
        let parts: Vec<String> = bytes
            .iter()
            .map(|b| match b {
                Some(b) => format!("{:02X}", b.fg::<ValueColor>()),
                None => "??".fg::<MissingColor>().to_string(),
            })
            .collect();
        println!("[{}]", parts.join(" "));
        Ok(())
    }

    fn describe(&self, _args: &Args, hex: &str) -> Result<()> {
        let span = trace_span!("describe");
        let _enter = span.enter();

        let tree = emv::describe_hex(hex).context("Couldn't describe EMV response")?;
        print_tree(&tree, 0);
        Ok(())
    }

    fn card(&self, _args: &Args, mask: bool, hex: &str) -> Result<()> {
        let span = trace_span!("card");
        let _enter = span.enter();

        let response = codec::decode(hex).context("EMV response isn't valid hex")?;
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .context("Couldn't start async runtime")?;
        let info = rt
            .block_on(emv::read_card_info(&BerDescriber::new(), &response))
            .ok_or(anyhow!("No Track 2 Equivalent Data in response"))?;

        let card = if mask {
            info.masked_card()
        } else {
            info.card.clone()
        };
        println!("Card: {}", card.fg::<ValueColor>());
        println!("Exp:  {}", info.formatted_exp().fg::<ValueColor>());
        Ok(())
    }

    fn ndef(&self, _args: &Args, hex: &str) -> Result<()> {
        let span = trace_span!("ndef");
        let _enter = span.enter();

        let message = codec::decode(hex).context("NDEF message isn't valid hex")?;
        let records = ndef::parse_message(&message).context("Couldn't parse NDEF message")?;
        for (i, record) in records.iter().enumerate() {
            println!(
                "#{} {:?} {} {}",
                i,
                record.header.tnf.fg::<TagColor>(),
                String::from_utf8_lossy(&record.record_type).fg::<TagColor>(),
                codec::to_hex_string(&record.payload).fg::<ValueColor>(),
            );
            if let Some(text) = record.text() {
                let text = text.context("Couldn't decode Text record")?;
                println!("   [{}] {}", text.language.italic(), text.text);
            }
        }
        Ok(())
    }
}

fn print_tree(nodes: &[TlvNode], depth: usize) {
    let indent = "  ".repeat(depth);
    for node in nodes {
        let name = node.known_tag().map(|t| t.name()).unwrap_or_default();
        match node {
            TlvNode::Template { tag, children } => {
                println!("{}{} {}", indent, tag.fg::<TemplateColor>(), name.italic());
                print_tree(children, depth + 1);
            }
            TlvNode::Leaf { tag, value } => {
                println!(
                    "{}{} {} {}",
                    indent,
                    tag.fg::<TagColor>(),
                    value.fg::<ValueColor>(),
                    name.italic()
                );
                if tag == track2::TRACK2_EQUIVALENT_DATA {
                    match Track2::parse(value) {
                        Some(t2) => print_track2(&t2, depth + 1),
                        None => println!("{}  (no separator)", indent),
                    }
                }
            }
        }
    }
}

fn print_track2(t2: &Track2, depth: usize) {
    let indent = "  ".repeat(depth);
    println!("{}PAN          {}", indent, t2.pan);
    println!(
        "{}Expiry       {}",
        indent,
        track2::format_card_exp(&t2.expiry)
    );
    if let Some(sc) = &t2.service_code {
        println!("{}Service code {}", indent, sc);
    }
    if !t2.discretionary_data.is_empty() {
        println!("{}Discretionary {}", indent, t2.discretionary_data);
    }
}

fn parse_value(s: &str) -> Result<i64, std::num::ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

fn init_logging(args: &Args) {
    tracing_subscriber::fmt()
        .without_time()
        .with_target(false)
        .with_max_level(match 2 + args.verbose as i16 - args.quiet as i16 {
            i16::MIN..=0 => tracing::Level::ERROR,
            1 => tracing::Level::WARN,
            2 => tracing::Level::INFO,
            3 => tracing::Level::DEBUG,
            4.. => tracing::Level::TRACE,
        })
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);
    trace!(?args, "Starting up");
    args.command.run(&args)
}
