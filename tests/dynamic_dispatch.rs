use vcu_dynamic::dynamic::{
    parse, ControlMessage, ControlSurface, DispatchStatus, Dispatcher, EmitError, EncoderProperty,
    ParseError, RegionOfInterest,
};

/// Stand-in for a frame buffer: its index and any regions attached to it
#[derive(Debug, Default)]
struct TestFrame {
    index: u64,
    regions: Vec<RegionOfInterest>,
}

#[derive(Default)]
struct Encoder {
    properties: Vec<(EncoderProperty, u32)>,
    roi_qp_mode: bool,
    key_frames: Vec<u64>,
    events: Vec<(u64, ControlMessage)>,
    executions: usize,
}

impl ControlSurface<TestFrame> for Encoder {
    fn set_property(&mut self, property: EncoderProperty, value: u32) {
        self.executions += 1;
        self.properties.push((property, value));
    }

    fn enable_region_qp_mode(&mut self) {
        self.roi_qp_mode = true;
    }

    fn force_key_frame(&mut self, frame: &mut TestFrame) {
        self.executions += 1;
        self.key_frames.push(frame.index);
    }

    fn annotate_region(&mut self, frame: &mut TestFrame, region: &RegionOfInterest) {
        self.executions += 1;
        frame.regions.push(region.clone());
    }

    fn send_downstream(
        &mut self,
        frame: &mut TestFrame,
        message: ControlMessage,
    ) -> Result<(), EmitError> {
        self.executions += 1;
        self.events.push((frame.index, message));
        Ok(())
    }
}

/// Feed frames `0..frames` and return every frame after it passed the hook
fn stream(dispatcher: &mut Dispatcher<Encoder>, frames: u64) -> Vec<TestFrame> {
    (0..frames)
        .map(|index| {
            let mut frame = TestFrame {
                index,
                ..Default::default()
            };
            dispatcher.on_frame(&mut frame);
            frame
        })
        .collect()
}

#[test]
fn region_annotation_lands_on_trigger_frame_only() {
    let directive = parse("ROI:10:50x60:40x40:high").unwrap();
    let mut dispatcher = Dispatcher::new(directive, Encoder::default());

    let frames = stream(&mut dispatcher, 30);

    for frame in &frames {
        if frame.index == 10 {
            assert_eq!(
                frame.regions,
                vec![RegionOfInterest {
                    x: 50,
                    y: 60,
                    width: 40,
                    height: 40,
                    quality: "high".into(),
                }]
            );
        } else {
            assert!(frame.regions.is_empty(), "frame {} annotated", frame.index);
        }
    }
    assert!(dispatcher.surface().roi_qp_mode);
}

#[test]
fn region_qp_mode_waits_for_trigger() {
    let directive = parse("ROI:10:0x0:16x16:low").unwrap();
    let mut dispatcher = Dispatcher::new(directive, Encoder::default());

    stream(&mut dispatcher, 10);
    assert!(!dispatcher.surface().roi_qp_mode);

    stream_from(&mut dispatcher, 10, 11);
    assert!(dispatcher.surface().roi_qp_mode);
}

fn stream_from(dispatcher: &mut Dispatcher<Encoder>, start: u64, end: u64) {
    for index in start..end {
        let mut frame = TestFrame {
            index,
            ..Default::default()
        };
        dispatcher.on_frame(&mut frame);
    }
}

#[test]
fn executes_once_when_trigger_within_stream() {
    for trigger in [0u64, 1, 57, 99, 100] {
        let mut dispatcher =
            Dispatcher::new(parse(&format!("BR:{trigger}:1000")).unwrap(), Encoder::default());
        stream(&mut dispatcher, 101);

        let encoder = dispatcher.surface();
        assert_eq!(encoder.executions, 1, "trigger {trigger}");
        assert_eq!(
            encoder.properties,
            vec![(EncoderProperty::TargetBitrate, 1000)]
        );
        assert_eq!(dispatcher.status(), DispatchStatus::Fired { frame: trigger });
    }
}

#[test]
fn never_executes_when_trigger_beyond_stream() {
    let mut dispatcher = Dispatcher::new(parse("KF:101").unwrap(), Encoder::default());
    stream(&mut dispatcher, 101);

    assert_eq!(dispatcher.surface().executions, 0);
    assert_eq!(
        dispatcher.finish(),
        DispatchStatus::Pending {
            frames_remaining: 0
        }
    );
}

#[test]
fn stream_hints_carry_frame_and_payload() {
    let mut dispatcher = Dispatcher::new(parse("SC:20:5").unwrap(), Encoder::default());
    stream(&mut dispatcher, 40);
    assert_eq!(
        dispatcher.surface().events,
        vec![(20, ControlMessage::SceneChange { look_ahead: 5 })]
    );

    let mut dispatcher = Dispatcher::new(parse("KF:3").unwrap(), Encoder::default());
    stream(&mut dispatcher, 10);
    assert_eq!(dispatcher.surface().key_frames, vec![3]);
}

#[test]
fn invalid_descriptors_install_nothing() {
    assert!(matches!(parse("XX:5:1"), Err(ParseError::UnknownKind(_))));
    assert!(matches!(
        parse("ROI:1200:300"),
        Err(ParseError::MalformedField { .. })
    ));
    assert!(matches!(
        parse("GL:ten:30"),
        Err(ParseError::MalformedField { .. })
    ));
}
