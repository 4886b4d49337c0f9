use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use crate::errors::AnalysisError;

#[derive(Debug, Clone)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
    pub timestamp: i64,
    pub heart_rate: Option<f64>,
    pub cadence: Option<f64>,
}

pub fn ingest_file(path: &Path, performance: bool) -> Result<Vec<TrackPoint>, AnalysisError> {
    let bytes = fs::read(path)?;
    ingest_bytes(&bytes, performance)
}

/// Parse a GPX document into one flat, file-ordered point sequence.
///
/// Every point must carry elevation and a timestamp. In performance mode the
/// hr/cadence extension values are attached per point as well.
pub fn ingest_bytes(bytes: &[u8], performance: bool) -> Result<Vec<TrackPoint>, AnalysisError> {
    let parsed = gpx::read(bytes).map_err(|e| AnalysisError::Gpx(e.to_string()))?;

    let mut points = Vec::new();
    let mut index = 0;

    for track in &parsed.tracks {
        for segment in &track.segments {
            for pt in &segment.points {
                let elevation = pt.elevation.ok_or(AnalysisError::MalformedTrack {
                    index,
                    field: "elevation",
                })?;
                let time = pt.time.ok_or(AnalysisError::MalformedTrack {
                    index,
                    field: "time",
                })?;
                let timestamp = parse_epoch_seconds(&time, index)?;

                points.push(TrackPoint {
                    latitude: pt.point().y(),
                    longitude: pt.point().x(),
                    elevation,
                    timestamp,
                    heart_rate: None,
                    cadence: None,
                });
                index += 1;
            }
        }
    }

    if performance {
        attach_performance_fields(bytes, &mut points)?;
    }

    debug!(points = points.len(), performance, "ingested track");
    Ok(points)
}

fn parse_epoch_seconds(time: &gpx::Time, index: usize) -> Result<i64, AnalysisError> {
    let formatted = time.format().map_err(|e| AnalysisError::Gpx(e.to_string()))?;
    let parsed = formatted
        .parse::<DateTime<Utc>>()
        .map_err(|_| AnalysisError::MalformedTrack {
            index,
            field: "time",
        })?;
    Ok(parsed.timestamp())
}

#[derive(Debug, Default, Clone, Copy)]
struct ExtensionFields {
    heart_rate: Option<f64>,
    cadence: Option<f64>,
}

fn attach_performance_fields(
    input: &[u8],
    points: &mut [TrackPoint],
) -> Result<(), AnalysisError> {
    let fields = scan_point_extensions(input)?;

    if fields.len() != points.len() {
        return Err(AnalysisError::Xml(format!(
            "extension scan found {} track points, parser found {}",
            fields.len(),
            points.len()
        )));
    }

    for (index, (point, ext)) in points.iter_mut().zip(fields).enumerate() {
        let heart_rate = ext.heart_rate.ok_or(AnalysisError::MissingExtension {
            index,
            field: "hr",
        })?;
        let cadence = ext.cadence.ok_or(AnalysisError::MissingExtension {
            index,
            field: "cad",
        })?;
        point.heart_rate = Some(heart_rate);
        point.cadence = Some(cadence);
    }

    Ok(())
}

/// Stream over the raw document and collect, per `<trkpt>`, the first
/// extension tag whose name contains "hr" and the first containing "cad".
/// Matching is keyed to each point's own `<extensions>` block, never by
/// position across separate arrays.
fn scan_point_extensions(input: &[u8]) -> Result<Vec<ExtensionFields>, AnalysisError> {
    let mut reader = Reader::from_reader(input);
    let mut buf = Vec::new();

    let mut fields: Vec<ExtensionFields> = Vec::new();
    let mut in_trkpt = false;
    let mut in_extensions = false;
    let mut capture: Option<&'static str> = None;
    let mut text = String::new();

    loop {
        let event = match reader.read_event_into(&mut buf) {
            Err(e) => {
                return Err(AnalysisError::Xml(format!(
                    "error at position {}: {:?}",
                    reader.buffer_position(),
                    e
                )));
            }
            Ok(Event::Eof) => break,
            Ok(event) => event.into_owned(),
        };

        match event {
            Event::Start(ref e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "trkpt" {
                    in_trkpt = true;
                    fields.push(ExtensionFields::default());
                } else if in_trkpt && name == "extensions" {
                    in_extensions = true;
                } else if in_extensions {
                    if let Some(current) = fields.last() {
                        if current.heart_rate.is_none() && name.contains("hr") {
                            capture = Some("hr");
                            text.clear();
                        } else if current.cadence.is_none() && name.contains("cad") {
                            capture = Some("cad");
                            text.clear();
                        }
                    }
                }
            }

            Event::Empty(ref e) => {
                if e.name().as_ref() == b"trkpt" {
                    fields.push(ExtensionFields::default());
                }
            }

            Event::Text(ref e) => {
                if capture.is_some() {
                    text.push_str(&e.unescape().unwrap_or_default());
                }
            }

            Event::End(ref e) => {
                let qname = e.name();
                let name = String::from_utf8_lossy(qname.as_ref());
                if name == "trkpt" {
                    in_trkpt = false;
                    in_extensions = false;
                    capture = None;
                } else if name == "extensions" {
                    in_extensions = false;
                    capture = None;
                } else if let Some(kind) = capture {
                    if name.contains(kind) {
                        // Unparseable values are left unset and surface later
                        // as a missing extension for that point.
                        if let (Some(current), Ok(value)) =
                            (fields.last_mut(), text.trim().parse::<f64>())
                        {
                            match kind {
                                "hr" => current.heart_rate = Some(value),
                                _ => current.cadence = Some(value),
                            }
                        }
                        capture = None;
                    }
                }
            }

            _ => {}
        }

        buf.clear();
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_GPX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test">
  <trk>
    <name>Morning Run</name>
    <trkseg>
      <trkpt lat="37.7749" lon="-122.4194">
        <ele>100.0</ele>
        <time>2023-01-01T10:00:00Z</time>
        <extensions>
          <ns3:TrackPointExtension xmlns:ns3="http://www.garmin.com/xmlschemas/TrackPointExtension/v1">
            <ns3:hr>150</ns3:hr>
            <ns3:cad>85</ns3:cad>
          </ns3:TrackPointExtension>
        </extensions>
      </trkpt>
      <trkpt lat="37.7750" lon="-122.4195">
        <ele>101.5</ele>
        <time>2023-01-01T10:00:02Z</time>
        <extensions>
          <ns3:TrackPointExtension xmlns:ns3="http://www.garmin.com/xmlschemas/TrackPointExtension/v1">
            <ns3:hr>155</ns3:hr>
            <ns3:cad>87</ns3:cad>
          </ns3:TrackPointExtension>
        </extensions>
      </trkpt>
      <trkpt lat="37.7751" lon="-122.4196">
        <ele>102.0</ele>
        <time>2023-01-01T10:00:10Z</time>
        <extensions>
          <ns3:TrackPointExtension xmlns:ns3="http://www.garmin.com/xmlschemas/TrackPointExtension/v1">
            <ns3:hr>160</ns3:hr>
            <ns3:cad>88</ns3:cad>
          </ns3:TrackPointExtension>
        </extensions>
      </trkpt>
    </trkseg>
  </trk>
</gpx>"#;

    #[test]
    fn test_basic_ingestion() {
        let points = ingest_bytes(SAMPLE_GPX.as_bytes(), false).unwrap();

        assert_eq!(points.len(), 3);
        assert!((points[0].latitude - 37.7749).abs() < 1e-9);
        assert!((points[0].longitude - (-122.4194)).abs() < 1e-9);
        assert_eq!(points[0].elevation, 100.0);
        assert_eq!(points[0].timestamp, 1672567200);
        assert_eq!(points[2].timestamp, 1672567210);
        assert!(points[0].heart_rate.is_none());
        assert!(points[0].cadence.is_none());
    }

    #[test]
    fn test_performance_ingestion() {
        let points = ingest_bytes(SAMPLE_GPX.as_bytes(), true).unwrap();

        assert_eq!(points.len(), 3);
        assert_eq!(points[0].heart_rate, Some(150.0));
        assert_eq!(points[0].cadence, Some(85.0));
        assert_eq!(points[2].heart_rate, Some(160.0));
        assert_eq!(points[2].cadence, Some(88.0));
    }

    #[test]
    fn test_missing_elevation_is_malformed() {
        let gpx_no_ele = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test">
  <trk>
    <trkseg>
      <trkpt lat="37.7749" lon="-122.4194">
        <ele>100.0</ele>
        <time>2023-01-01T10:00:00Z</time>
      </trkpt>
      <trkpt lat="37.7750" lon="-122.4195">
        <time>2023-01-01T10:00:02Z</time>
      </trkpt>
    </trkseg>
  </trk>
</gpx>"#;

        let err = ingest_bytes(gpx_no_ele.as_bytes(), false).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::MalformedTrack {
                index: 1,
                field: "elevation"
            }
        ));
    }

    #[test]
    fn test_missing_timestamp_is_malformed() {
        let gpx_no_time = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test">
  <trk>
    <trkseg>
      <trkpt lat="37.7749" lon="-122.4194">
        <ele>100.0</ele>
      </trkpt>
    </trkseg>
  </trk>
</gpx>"#;

        let err = ingest_bytes(gpx_no_time.as_bytes(), false).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::MalformedTrack {
                index: 0,
                field: "time"
            }
        ));
    }

    #[test]
    fn test_performance_mode_requires_every_point() {
        let gpx_partial = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test">
  <trk>
    <trkseg>
      <trkpt lat="37.7749" lon="-122.4194">
        <ele>100.0</ele>
        <time>2023-01-01T10:00:00Z</time>
        <extensions>
          <ns3:TrackPointExtension xmlns:ns3="http://www.garmin.com/xmlschemas/TrackPointExtension/v1">
            <ns3:hr>150</ns3:hr>
            <ns3:cad>85</ns3:cad>
          </ns3:TrackPointExtension>
        </extensions>
      </trkpt>
      <trkpt lat="37.7750" lon="-122.4195">
        <ele>101.5</ele>
        <time>2023-01-01T10:00:02Z</time>
        <extensions>
          <ns3:TrackPointExtension xmlns:ns3="http://www.garmin.com/xmlschemas/TrackPointExtension/v1">
            <ns3:hr>155</ns3:hr>
          </ns3:TrackPointExtension>
        </extensions>
      </trkpt>
    </trkseg>
  </trk>
</gpx>"#;

        // Without performance mode the same track ingests fine.
        assert!(ingest_bytes(gpx_partial.as_bytes(), false).is_ok());

        let err = ingest_bytes(gpx_partial.as_bytes(), true).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::MissingExtension {
                index: 1,
                field: "cad"
            }
        ));
    }

    #[test]
    fn test_multiple_segments_are_flattened_in_order() {
        let gpx_two_segments = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test">
  <trk>
    <trkseg>
      <trkpt lat="37.7749" lon="-122.4194">
        <ele>100.0</ele>
        <time>2023-01-01T10:00:00Z</time>
      </trkpt>
    </trkseg>
    <trkseg>
      <trkpt lat="37.7760" lon="-122.4200">
        <ele>110.0</ele>
        <time>2023-01-01T10:05:00Z</time>
      </trkpt>
    </trkseg>
  </trk>
</gpx>"#;

        let points = ingest_bytes(gpx_two_segments.as_bytes(), false).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].elevation, 100.0);
        assert_eq!(points[1].elevation, 110.0);
    }
}
